//! Daily message selection — deterministic day-indexed rotation plus the
//! admin override queue.
//!
//! The rotation walks the non-interactive catalog pool by day number, so
//! re-running the same day's broadcast always re-selects the same message.
//! A queued override preempts the rotation exactly once, oldest entry
//! first.

use std::sync::Arc;

use chrono::NaiveDate;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::catalog::{Message, MessageCatalog};
use crate::error::{CatalogError, Result};
use crate::store::Store;

pub struct DailySelector {
    catalog: Arc<MessageCatalog>,
    store: Arc<dyn Store>,
    /// Reference date for the rotation index.
    epoch: NaiveDate,
    /// Serializes queue consumption against concurrent enqueues and
    /// selections, so exactly one caller observes and consumes a given
    /// unconsumed entry.
    queue_lock: Mutex<()>,
}

impl DailySelector {
    pub fn new(catalog: Arc<MessageCatalog>, store: Arc<dyn Store>, epoch: NaiveDate) -> Self {
        Self {
            catalog,
            store,
            epoch,
            queue_lock: Mutex::new(()),
        }
    }

    /// Whole days between the rotation epoch and `date`. Negative for
    /// pre-epoch dates; the caller maps it into the pool with `rem_euclid`.
    fn day_number(&self, date: NaiveDate) -> i64 {
        (date - self.epoch).num_days()
    }

    /// Pick the message to send on `date`.
    ///
    /// The oldest unconsumed override wins and is marked consumed before
    /// anything else happens. An override whose id no longer resolves is
    /// still consumed — a stale entry must not be re-offered — and
    /// selection falls through to the rotation.
    pub async fn select_for_today(&self, date: NaiveDate) -> Result<Message> {
        let _guard = self.queue_lock.lock().await;

        if let Some(entry) = self.store.oldest_unconsumed_override().await? {
            self.store.mark_override_consumed(entry.id).await?;
            match self.catalog.get(entry.message_id) {
                Ok(msg) => {
                    info!(
                        message_id = msg.id,
                        requested_by = %entry.requested_by,
                        "Serving queued override"
                    );
                    return Ok(msg.clone());
                }
                Err(_) => {
                    warn!(
                        message_id = entry.message_id,
                        "Override references a missing message; discarding and \
                         falling back to rotation"
                    );
                }
            }
        }

        Ok(self.rotation_pick(date)?.clone())
    }

    /// The deterministic day-indexed pick over the non-interactive pool.
    fn rotation_pick(&self, date: NaiveDate) -> Result<&Message> {
        let pool: Vec<&Message> = self.catalog.rotation_pool().collect();
        if pool.is_empty() {
            return Err(CatalogError::NoEligible.into());
        }
        let idx = self.day_number(date).rem_euclid(pool.len() as i64) as usize;
        Ok(pool[idx])
    }

    /// Queue `message_id` to preempt the next daily pick.
    ///
    /// Existence is deliberately not checked here; a stale id is discarded
    /// at selection time. Entries queue up FIFO — enqueueing while another
    /// entry is pending makes this one "next after next".
    pub async fn enqueue_override(&self, message_id: u32, requested_by: &str) -> Result<()> {
        let _guard = self.queue_lock.lock().await;
        self.store.enqueue_override(message_id, requested_by).await?;
        info!(message_id, requested_by, "Override queued");
        Ok(())
    }

    /// Look up a message without touching selection state. Pure read.
    pub fn preview(&self, id: u32) -> Result<&Message> {
        Ok(self.catalog.get(id)?)
    }

    /// A uniformly random id from the rotation pool, for the bare `SKIP`
    /// verb.
    pub fn random_eligible(&self) -> Result<u32> {
        let pool: Vec<&Message> = self.catalog.rotation_pool().collect();
        if pool.is_empty() {
            return Err(CatalogError::NoEligible.into());
        }
        let idx = rand::thread_rng().gen_range(0..pool.len());
        Ok(pool[idx].id)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MessageKind, Trigger, TriggerResponse};
    use crate::error::Error;
    use crate::store::LibSqlStore;

    fn message(id: u32, kind: MessageKind, text: &str) -> Message {
        Message {
            id,
            kind,
            text: text.into(),
            author: None,
            prepend: None,
            quoted: false,
            trigger: None,
            response: None,
        }
    }

    fn interactive(id: u32, keyword: &str) -> Message {
        Message {
            id,
            kind: MessageKind::Interactive,
            text: String::new(),
            author: None,
            prepend: None,
            quoted: false,
            trigger: Some(Trigger {
                keyword: keyword.into(),
                text: format!("Text {keyword}"),
            }),
            response: Some(TriggerResponse {
                text: "payload".into(),
                author: None,
            }),
        }
    }

    fn epoch() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    async fn selector(messages: Vec<Message>) -> DailySelector {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let catalog = Arc::new(MessageCatalog::new(messages).unwrap());
        DailySelector::new(catalog, store, epoch())
    }

    fn standard_catalog() -> Vec<Message> {
        vec![
            message(1, MessageKind::Inspiration, "A"),
            message(2, MessageKind::Intervention, "B"),
            interactive(61, "WTF"),
        ]
    }

    // ── Deterministic rotation ──────────────────────────────────────

    #[tokio::test]
    async fn same_date_yields_same_message() {
        let sel = selector(standard_catalog()).await;
        let date = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();

        let first = sel.select_for_today(date).await.unwrap();
        let second = sel.select_for_today(date).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn rotation_indexes_by_day_number() {
        let sel = selector(standard_catalog()).await;

        // Two eligible messages: even day numbers pick item 1, odd pick 2.
        let even_day = epoch() + chrono::Days::new(10);
        let odd_day = epoch() + chrono::Days::new(11);
        assert_eq!(sel.select_for_today(even_day).await.unwrap().id, 1);
        assert_eq!(sel.select_for_today(odd_day).await.unwrap().id, 2);
    }

    #[tokio::test]
    async fn interactive_messages_never_rotate_in() {
        let sel = selector(standard_catalog()).await;

        for offset in 0..10 {
            let date = epoch() + chrono::Days::new(offset);
            let picked = sel.select_for_today(date).await.unwrap();
            assert_ne!(picked.kind, MessageKind::Interactive);
        }
    }

    #[tokio::test]
    async fn pre_epoch_dates_stay_in_range() {
        let sel = selector(standard_catalog()).await;
        let before = epoch() - chrono::Days::new(3);
        let picked = sel.select_for_today(before).await.unwrap();
        assert!(picked.id == 1 || picked.id == 2);
    }

    #[tokio::test]
    async fn interactive_only_catalog_has_no_eligible_pick() {
        let sel = selector(vec![interactive(61, "WTF")]).await;
        let result = sel.select_for_today(epoch()).await;
        assert!(matches!(
            result,
            Err(Error::Catalog(CatalogError::NoEligible))
        ));
    }

    // ── Overrides ───────────────────────────────────────────────────

    #[tokio::test]
    async fn override_preempts_rotation_exactly_once() {
        let sel = selector(standard_catalog()).await;
        let even_day = epoch() + chrono::Days::new(10);

        sel.enqueue_override(2, "+15559999999").await.unwrap();
        assert_eq!(sel.select_for_today(even_day).await.unwrap().id, 2);
        // Queue drained: back to the deterministic pick.
        assert_eq!(sel.select_for_today(even_day).await.unwrap().id, 1);
    }

    #[tokio::test]
    async fn overrides_consume_fifo_one_per_selection() {
        let sel = selector(standard_catalog()).await;
        let date = epoch() + chrono::Days::new(10);

        sel.enqueue_override(2, "admin").await.unwrap();
        sel.enqueue_override(61, "admin").await.unwrap();

        assert_eq!(sel.select_for_today(date).await.unwrap().id, 2);
        assert_eq!(sel.select_for_today(date).await.unwrap().id, 61);
        assert_eq!(sel.select_for_today(date).await.unwrap().id, 1);
    }

    #[tokio::test]
    async fn stale_override_is_consumed_and_falls_through() {
        let sel = selector(standard_catalog()).await;
        let even_day = epoch() + chrono::Days::new(10);

        sel.enqueue_override(999, "admin").await.unwrap();
        // The stale entry is burned, rotation answers instead.
        assert_eq!(sel.select_for_today(even_day).await.unwrap().id, 1);
        // And it is gone for good.
        assert_eq!(sel.select_for_today(even_day).await.unwrap().id, 1);
    }

    // ── Preview / random pick ───────────────────────────────────────

    #[tokio::test]
    async fn preview_does_not_affect_selection() {
        let sel = selector(standard_catalog()).await;
        let even_day = epoch() + chrono::Days::new(10);

        assert_eq!(sel.preview(2).unwrap().id, 2);
        assert!(sel.preview(999).is_err());
        assert_eq!(sel.select_for_today(even_day).await.unwrap().id, 1);
    }

    #[tokio::test]
    async fn random_eligible_stays_in_rotation_pool() {
        let sel = selector(standard_catalog()).await;
        for _ in 0..20 {
            let id = sel.random_eligible().unwrap();
            assert!(id == 1 || id == 2, "unexpected id {id}");
        }
    }
}
