//! Message catalog — the read-only, indexed set of candidate daily messages.
//!
//! Built once at startup from the store and never mutated afterwards. All
//! selection, preview, and keyword lookups resolve against this catalog.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, ConfigError};

// ── Models ──────────────────────────────────────────────────────────

/// Kind of a catalog message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// A quote or thought, sent with author and footer.
    Inspiration,
    /// A blunter nudge, formatted the same way as an inspiration.
    Intervention,
    /// A public prompt whose real payload is gated behind a keyword reply.
    /// Never selected by the daily rotation.
    Interactive,
}

impl MessageKind {
    /// Short label for logging and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inspiration => "inspiration",
            Self::Intervention => "intervention",
            Self::Interactive => "interactive",
        }
    }

    /// Parse a storage label. Unknown labels fall back to `Inspiration`,
    /// matching how legacy rows without a kind were treated.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "intervention" => Self::Intervention,
            "interactive" => Self::Interactive,
            _ => Self::Inspiration,
        }
    }
}

/// The public half of an interactive message: the prompt everyone sees
/// and the keyword that unlocks the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub keyword: String,
    pub text: String,
}

/// The gated half of an interactive message, shown only to a subscriber
/// who texts the keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// A single catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Positive, unique, stable across the catalog's lifetime.
    pub id: u32,
    pub kind: MessageKind,
    /// Body text. Empty for `interactive` messages, whose daily rendering
    /// comes from `trigger.text` instead.
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Text prefixed to the body before quoting, e.g. "Real talk: ".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepend: Option<String>,
    /// Render the body wrapped in quotation marks.
    #[serde(default)]
    pub quoted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<TriggerResponse>,
}

impl Message {
    pub fn is_interactive(&self) -> bool {
        self.kind == MessageKind::Interactive
    }
}

// ── Catalog ─────────────────────────────────────────────────────────

/// Indexed, insertion-ordered message collection. Read-only after
/// construction.
#[derive(Debug)]
pub struct MessageCatalog {
    messages: Vec<Message>,
    by_id: HashMap<u32, usize>,
}

impl MessageCatalog {
    /// Validate and index a message list.
    ///
    /// Fails on an empty list, a non-positive or duplicate id, or an
    /// interactive message missing its trigger keyword or response text.
    /// These are configuration errors: the engine must not start on a
    /// catalog that can misroute a keyword or serve a half-built message.
    pub fn new(messages: Vec<Message>) -> Result<Self, ConfigError> {
        if messages.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }

        let mut by_id = HashMap::with_capacity(messages.len());
        for (idx, msg) in messages.iter().enumerate() {
            if msg.id == 0 {
                return Err(ConfigError::InvalidMessage {
                    id: msg.id,
                    reason: "message id must be positive".into(),
                });
            }
            if by_id.insert(msg.id, idx).is_some() {
                return Err(ConfigError::DuplicateMessageId { id: msg.id });
            }
            if msg.is_interactive() {
                let has_keyword = msg
                    .trigger
                    .as_ref()
                    .is_some_and(|t| !t.keyword.trim().is_empty());
                if !has_keyword {
                    return Err(ConfigError::InvalidMessage {
                        id: msg.id,
                        reason: "interactive message requires a trigger keyword".into(),
                    });
                }
                let has_response = msg
                    .response
                    .as_ref()
                    .is_some_and(|r| !r.text.trim().is_empty());
                if !has_response {
                    return Err(ConfigError::InvalidMessage {
                        id: msg.id,
                        reason: "interactive message requires a response text".into(),
                    });
                }
            }
        }

        Ok(Self { messages, by_id })
    }

    /// Look up a message by id.
    pub fn get(&self, id: u32) -> Result<&Message, CatalogError> {
        self.by_id
            .get(&id)
            .map(|&idx| &self.messages[idx])
            .ok_or(CatalogError::NotFound { id })
    }

    /// All messages in insertion order.
    pub fn all(&self) -> &[Message] {
        &self.messages
    }

    pub fn count_by_kind(&self, kind: MessageKind) -> usize {
        self.messages.iter().filter(|m| m.kind == kind).count()
    }

    /// Non-interactive messages in catalog order — the pool the daily
    /// rotation indexes into. Interactive messages are reachable only via
    /// their keyword.
    pub fn rotation_pool(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| !m.is_interactive())
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn inspiration(id: u32, text: &str) -> Message {
        Message {
            id,
            kind: MessageKind::Inspiration,
            text: text.into(),
            author: None,
            prepend: None,
            quoted: false,
            trigger: None,
            response: None,
        }
    }

    fn interactive(id: u32, keyword: &str, prompt: &str, response: &str) -> Message {
        Message {
            id,
            kind: MessageKind::Interactive,
            text: String::new(),
            author: None,
            prepend: None,
            quoted: false,
            trigger: Some(Trigger {
                keyword: keyword.into(),
                text: prompt.into(),
            }),
            response: Some(TriggerResponse {
                text: response.into(),
                author: None,
            }),
        }
    }

    // ── Construction validation ─────────────────────────────────────

    #[test]
    fn empty_catalog_rejected() {
        assert!(matches!(
            MessageCatalog::new(vec![]),
            Err(ConfigError::EmptyCatalog)
        ));
    }

    #[test]
    fn duplicate_id_rejected() {
        let result = MessageCatalog::new(vec![inspiration(1, "a"), inspiration(1, "b")]);
        assert!(matches!(
            result,
            Err(ConfigError::DuplicateMessageId { id: 1 })
        ));
    }

    #[test]
    fn zero_id_rejected() {
        assert!(matches!(
            MessageCatalog::new(vec![inspiration(0, "a")]),
            Err(ConfigError::InvalidMessage { .. })
        ));
    }

    #[test]
    fn interactive_without_keyword_rejected() {
        let mut msg = interactive(5, "GO", "prompt", "payload");
        msg.trigger = Some(Trigger {
            keyword: "   ".into(),
            text: "prompt".into(),
        });
        assert!(matches!(
            MessageCatalog::new(vec![msg]),
            Err(ConfigError::InvalidMessage { id: 5, .. })
        ));
    }

    #[test]
    fn interactive_without_response_rejected() {
        let mut msg = interactive(5, "GO", "prompt", "payload");
        msg.response = None;
        assert!(matches!(
            MessageCatalog::new(vec![msg]),
            Err(ConfigError::InvalidMessage { id: 5, .. })
        ));
    }

    // ── Lookups ─────────────────────────────────────────────────────

    #[test]
    fn get_returns_message() {
        let catalog = MessageCatalog::new(vec![inspiration(1, "a"), inspiration(7, "b")]).unwrap();
        assert_eq!(catalog.get(7).unwrap().text, "b");
    }

    #[test]
    fn get_unknown_id_is_not_found() {
        let catalog = MessageCatalog::new(vec![inspiration(1, "a")]).unwrap();
        assert!(matches!(
            catalog.get(999),
            Err(CatalogError::NotFound { id: 999 })
        ));
    }

    #[test]
    fn all_preserves_insertion_order() {
        let catalog =
            MessageCatalog::new(vec![inspiration(3, "c"), inspiration(1, "a"), inspiration(2, "b")])
                .unwrap();
        let ids: Vec<u32> = catalog.all().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn count_by_kind_counts() {
        let catalog = MessageCatalog::new(vec![
            inspiration(1, "a"),
            inspiration(2, "b"),
            interactive(61, "WTF", "Text WTF", "payload"),
        ])
        .unwrap();
        assert_eq!(catalog.count_by_kind(MessageKind::Inspiration), 2);
        assert_eq!(catalog.count_by_kind(MessageKind::Interactive), 1);
        assert_eq!(catalog.count_by_kind(MessageKind::Intervention), 0);
    }

    #[test]
    fn rotation_pool_excludes_interactive() {
        let catalog = MessageCatalog::new(vec![
            inspiration(1, "a"),
            interactive(61, "WTF", "Text WTF", "payload"),
            inspiration(2, "b"),
        ])
        .unwrap();
        let ids: Vec<u32> = catalog.rotation_pool().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
