//! Outbound channel senders.

pub mod email;
pub mod sms;

pub use email::{SmtpConfig, SmtpSender};
pub use sms::{TwilioConfig, TwilioSender, normalize_phone};

use async_trait::async_trait;

use crate::error::ChannelError;

/// One-way outbound transport for a single channel.
///
/// Failures come back as values — a sender must never panic or otherwise
/// unwind the broadcast loop.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Channel name, matched against `Subscriber::channel`.
    fn name(&self) -> &str;

    /// Deliver `body` to `address`.
    async fn send(&self, address: &str, body: &str) -> Result<(), ChannelError>;
}
