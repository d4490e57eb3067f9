//! Inbound command parsing and handling.
//!
//! Every inbound text becomes exactly one `Command` variant, and the
//! processor turns that into at most one reply. Privileged verbs from
//! non-admin senders are ignored without acknowledgement — the sender
//! cannot tell a denied verb from an unrecognized one.

use std::sync::Arc;

use tracing::{info, warn};

use crate::broadcast::{BroadcastStyle, format_daily};
use crate::catalog::{Message, MessageCatalog};
use crate::error::Result;
use crate::selector::DailySelector;
use crate::store::{Direction, Store};
use crate::triggers::TriggerRegistry;

/// Help text sent for `HELP`. Admin verbs are deliberately absent.
const HELP_TEXT: &str = "Dayline commands:\n\
    • HELP — Show this help\n\
    • STOP — Unsubscribe from the daily message. We won't be able to \
    message you again after that, so use with care.\n\n\
    When today's message comes with a keyword, text it back for a little \
    extra.";

// ── Parsing ─────────────────────────────────────────────────────────

/// A parsed inbound text. Closed set: adding a verb is a compile-checked
/// change in every match below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Stop,
    /// `SKIP` queues a random rotation pick; `SKIP <id>` queues that id.
    Skip(Option<u32>),
    /// `MORE <id>` previews a message without touching selection.
    More(u32),
    /// Anything else — possibly an interactive trigger keyword.
    Keyword(String),
}

impl Command {
    /// Parse an inbound text. Verbs are case-insensitive and surrounding
    /// whitespace is ignored.
    pub fn parse(input: &str) -> Self {
        let upper = input.trim().to_uppercase();
        let mut parts = upper.split_whitespace();

        match (parts.next(), parts.next(), parts.next()) {
            (Some("HELP" | "COMMANDS" | "INFO"), None, None) => Self::Help,
            // Carrier-standard opt-out keywords.
            (Some("STOP" | "STOPALL" | "UNSUBSCRIBE" | "CANCEL" | "END" | "QUIT"), None, None) => {
                Self::Stop
            }
            (Some("SKIP"), None, None) => Self::Skip(None),
            (Some("SKIP"), Some(arg), None) => match arg.parse() {
                Ok(id) => Self::Skip(Some(id)),
                Err(_) => Self::Keyword(upper),
            },
            (Some("MORE"), Some(arg), None) => match arg.parse() {
                Ok(id) => Self::More(id),
                Err(_) => Self::Keyword(upper),
            },
            _ => Self::Keyword(upper),
        }
    }
}

// ── Processor ───────────────────────────────────────────────────────

/// Turns one inbound text into at most one reply, with all collaborators
/// injected at construction.
pub struct CommandProcessor {
    selector: Arc<DailySelector>,
    catalog: Arc<MessageCatalog>,
    triggers: Arc<TriggerRegistry>,
    store: Arc<dyn Store>,
    /// Previews render with the same style the broadcast uses, so an
    /// admin sees exactly what would go out.
    style: BroadcastStyle,
}

impl CommandProcessor {
    pub fn new(
        selector: Arc<DailySelector>,
        catalog: Arc<MessageCatalog>,
        triggers: Arc<TriggerRegistry>,
        store: Arc<dyn Store>,
        style: BroadcastStyle,
    ) -> Self {
        Self {
            selector,
            catalog,
            triggers,
            store,
            style,
        }
    }

    /// Handle one inbound text from `sender`; returns the reply body, if
    /// any. Safe to call concurrently.
    pub async fn handle(&self, sender: &str, text: &str) -> Result<Option<String>> {
        self.log_conversation(sender, Direction::Inbound, text).await;

        let subscriber = self.store.get_subscriber(sender).await?;
        let is_admin = subscriber.as_ref().is_some_and(|s| s.is_admin);

        let reply = match Command::parse(text) {
            Command::Help => Some(HELP_TEXT.to_string()),
            Command::Stop => {
                self.store.set_unsubscribed(sender).await?;
                info!(sender, "Subscriber unsubscribed");
                // The carrier acknowledges opt-out keywords itself;
                // sending our own reply after STOP would violate it.
                None
            }
            Command::Skip(requested) if is_admin => {
                Some(self.handle_skip(sender, requested).await?)
            }
            Command::More(id) if is_admin => Some(self.render_preview(id)),
            Command::Skip(_) | Command::More(_) => {
                // Same outward behavior as an unrecognized text, but the
                // attempt is worth an audit trail.
                warn!(sender, "Ignoring privileged verb from non-admin sender");
                None
            }
            Command::Keyword(token) => self
                .triggers
                .resolve(&token)
                .and_then(render_trigger_response),
        };

        if let Some(body) = &reply {
            self.log_conversation(sender, Direction::Outbound, body).await;
        }
        Ok(reply)
    }

    /// Queue an override for the next daily send and confirm to the admin.
    async fn handle_skip(&self, sender: &str, requested: Option<u32>) -> Result<String> {
        let id = match requested {
            Some(id) => id,
            None => self.selector.random_eligible()?,
        };
        self.selector.enqueue_override(id, sender).await?;

        Ok(match self.catalog.get(id) {
            Ok(msg) => format!(
                "✅ Queued item {id} ({}) for the next daily send.",
                msg.kind.as_str()
            ),
            // Queued anyway — existence is only checked at selection time.
            Err(_) => format!(
                "✅ Queued item {id} for the next daily send. ⚠️ No item with \
                 that id exists right now; it will be skipped if still missing."
            ),
        })
    }

    /// Render a preview for `MORE <id>`. Unknown ids get an explicit
    /// not-found reply — this is a diagnostic tool, not a guessing game.
    fn render_preview(&self, id: u32) -> String {
        match self.selector.preview(id) {
            Ok(msg) => {
                let today = chrono::Utc::now().date_naive();
                let rendered = format_daily(msg, today, &self.style);
                format!("📋 Preview of item {id}:\n\n{rendered}")
            }
            Err(_) => format!("❌ Item {id} not found. Text HELP for available commands."),
        }
    }

    /// Best-effort conversation logging — a log failure never fails the
    /// command.
    async fn log_conversation(&self, address: &str, direction: Direction, body: &str) {
        if let Err(e) = self.store.append_conversation(address, direction, body).await {
            warn!(address, error = %e, "Failed to append conversation log");
        }
    }
}

/// The keyword-gated payload: response text plus attribution.
fn render_trigger_response(msg: &Message) -> Option<String> {
    let response = msg.response.as_ref()?;
    let mut body = response.text.clone();
    if let Some(author) = &response.author {
        body.push_str("\n--");
        body.push_str(author);
    }
    Some(body)
}

// ── Tests ───────────────────────────────────────────────────────────
