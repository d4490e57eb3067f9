//! Keyword → interactive-message lookup.
//!
//! Built once from the catalog at startup. Keywords are matched
//! case-insensitively with surrounding whitespace ignored, so a subscriber
//! texting "wtf", "WTF " or " Wtf" all reach the same message.

use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::{Message, MessageCatalog};
use crate::error::ConfigError;

/// Canonical form of a trigger keyword: trimmed, uppercased.
pub fn normalize_keyword(token: &str) -> String {
    token.trim().to_uppercase()
}

/// Maps normalized keywords to their owning interactive message.
#[derive(Debug)]
pub struct TriggerRegistry {
    catalog: Arc<MessageCatalog>,
    by_keyword: HashMap<String, u32>,
}

impl TriggerRegistry {
    /// Index every interactive message's keyword.
    ///
    /// Two interactive messages sharing a normalized keyword is a fatal
    /// configuration error: the engine cannot know which response the
    /// subscriber meant to unlock.
    pub fn new(catalog: Arc<MessageCatalog>) -> Result<Self, ConfigError> {
        let mut by_keyword = HashMap::new();
        for msg in catalog.all() {
            if !msg.is_interactive() {
                continue;
            }
            // Catalog construction guarantees interactive messages carry
            // a non-empty trigger keyword.
            let Some(trigger) = &msg.trigger else { continue };
            let keyword = normalize_keyword(&trigger.keyword);
            if let Some(first) = by_keyword.insert(keyword.clone(), msg.id) {
                return Err(ConfigError::DuplicateTriggerKeyword {
                    keyword,
                    first,
                    second: msg.id,
                });
            }
        }
        Ok(Self {
            catalog,
            by_keyword,
        })
    }

    /// Resolve an inbound token to its interactive message, if any.
    pub fn resolve(&self, token: &str) -> Option<&Message> {
        let id = self.by_keyword.get(&normalize_keyword(token))?;
        self.catalog.get(*id).ok()
    }

    /// Number of registered keywords.
    pub fn len(&self) -> usize {
        self.by_keyword.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_keyword.is_empty()
    }
}

// ── Tests ───────────────────────────────────────────────────────────
