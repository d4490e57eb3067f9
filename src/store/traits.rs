//! Unified `Store` trait — single async interface for all persistence.
//!
//! Covers the four persisted entities: the message catalog rows, the
//! subscriber list, the override queue, and the append-only conversation
//! log. Components receive `Arc<dyn Store>` and never touch SQL directly.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::catalog::Message;
use crate::error::StoreError;

// ── Models ──────────────────────────────────────────────────────────

/// A subscriber row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    /// Unique identity: an E.164 phone number or an email address.
    pub address: String,
    /// Channel this subscriber receives on ("sms", "email").
    pub channel: String,
    pub confirmed: bool,
    pub unsubscribed: bool,
    pub is_admin: bool,
    pub consent_given: bool,
    /// Idempotence guard: the broadcast never sends twice for the same date.
    pub last_sent_date: Option<NaiveDate>,
    pub opted_in_at: DateTime<Utc>,
}

impl Subscriber {
    /// A confirmed subscriber who has not opted out.
    pub fn is_eligible(&self) -> bool {
        self.confirmed && !self.unsubscribed
    }

    /// A plain confirmed subscriber with sensible defaults, for seeding
    /// and tests.
    pub fn new(address: &str, channel: &str) -> Self {
        Self {
            address: address.into(),
            channel: channel.into(),
            confirmed: true,
            unsubscribed: false,
            is_admin: false,
            consent_given: true,
            last_sent_date: None,
            opted_in_at: Utc::now(),
        }
    }
}

/// An override queue row. Entries are consumed oldest-first, exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideEntry {
    pub id: Uuid,
    pub message_id: u32,
    /// Identity of the admin who queued it.
    pub requested_by: String,
    pub consumed: bool,
    pub created_at: DateTime<Utc>,
}

/// Direction of a conversation-log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

// ── Trait ───────────────────────────────────────────────────────────

/// Backend-agnostic persistence trait.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Catalog messages ────────────────────────────────────────────

    /// Load every catalog message, in id order.
    async fn load_messages(&self) -> Result<Vec<Message>, StoreError>;

    /// Insert a catalog message (seeding and tests; the engine itself
    /// treats the catalog as read-only).
    async fn insert_message(&self, message: &Message) -> Result<(), StoreError>;

    // ── Subscribers ─────────────────────────────────────────────────

    async fn upsert_subscriber(&self, subscriber: &Subscriber) -> Result<(), StoreError>;

    async fn get_subscriber(&self, address: &str) -> Result<Option<Subscriber>, StoreError>;

    /// Every subscriber eligible for the daily broadcast: confirmed and
    /// not unsubscribed.
    async fn subscribers_for_broadcast(&self) -> Result<Vec<Subscriber>, StoreError>;

    /// Flip a subscriber's opt-out flag. A no-op for unknown addresses.
    async fn set_unsubscribed(&self, address: &str) -> Result<(), StoreError>;

    /// Record that `address` received the daily message for `date`.
    /// Single-row atomic update.
    async fn set_last_sent_date(&self, address: &str, date: NaiveDate) -> Result<(), StoreError>;

    // ── Override queue ──────────────────────────────────────────────

    /// Append an unconsumed override entry. The message id is not
    /// validated here; a stale id is discarded at selection time.
    async fn enqueue_override(
        &self,
        message_id: u32,
        requested_by: &str,
    ) -> Result<OverrideEntry, StoreError>;

    /// The oldest entry not yet consumed, if any.
    async fn oldest_unconsumed_override(&self) -> Result<Option<OverrideEntry>, StoreError>;

    /// Mark an entry consumed so it is never served again.
    async fn mark_override_consumed(&self, id: Uuid) -> Result<(), StoreError>;

    /// Number of entries still awaiting consumption.
    async fn pending_override_count(&self) -> Result<usize, StoreError>;

    // ── Conversation log ────────────────────────────────────────────

    /// Append one sent/received record. The engine only ever appends;
    /// it never reads the log back.
    async fn append_conversation(
        &self,
        address: &str,
        direction: Direction,
        body: &str,
    ) -> Result<(), StoreError>;
}
