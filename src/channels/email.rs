//! Email channel — outbound daily messages via SMTP (lettre).
//!
//! Outbound only: inbound commands arrive over SMS. The first line of the
//! formatted body doubles as the subject, so the inbox shows
//! "Dayline — August 7" without any extra plumbing.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::channels::ChannelSender;
use crate::error::ChannelError;

// ── Configuration ───────────────────────────────────────────────────

/// SMTP sender configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `None` if `SMTP_HOST` is not set (channel disabled).
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_HOST").ok()?;

        let port: u16 = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password = SecretString::from(std::env::var("SMTP_PASSWORD").unwrap_or_default());
        let from_address = std::env::var("SMTP_FROM").unwrap_or_else(|_| username.clone());

        Some(Self {
            host,
            port,
            username,
            password,
            from_address,
        })
    }
}

// ── Sender ──────────────────────────────────────────────────────────

/// Email sender backed by an SMTP relay.
pub struct SmtpSender {
    config: SmtpConfig,
}

impl SmtpSender {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ChannelSender for SmtpSender {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, address: &str, body: &str) -> Result<(), ChannelError> {
        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&self.config.host)
            .map_err(|e| ChannelError::SendFailed {
                channel: "email".into(),
                reason: format!("SMTP relay error: {e}"),
            })?
            .port(self.config.port)
            .credentials(creds)
            .build();

        let (subject, text) = split_subject(body);

        let email = Message::builder()
            .from(self.config.from_address.parse().map_err(|e| {
                ChannelError::SendFailed {
                    channel: "email".into(),
                    reason: format!("Invalid from address: {e}"),
                }
            })?)
            .to(address.parse().map_err(|_| ChannelError::InvalidAddress {
                channel: "email".into(),
                address: address.to_string(),
            })?)
            .subject(subject)
            .body(text.to_string())
            .map_err(|e| ChannelError::SendFailed {
                channel: "email".into(),
                reason: format!("Failed to build email: {e}"),
            })?;

        transport
            .send(&email)
            .map_err(|e| ChannelError::SendFailed {
                channel: "email".into(),
                reason: format!("SMTP send failed: {e}"),
            })?;

        debug!(to = address, "Email sent");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Use the formatted body's first line as the subject and the remainder
/// as the email text. A single-line body becomes both.
fn split_subject(body: &str) -> (&str, &str) {
    match body.split_once('\n') {
        Some((first, rest)) => (first.trim(), rest.trim_start_matches('\n')),
        None => (body, body),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
