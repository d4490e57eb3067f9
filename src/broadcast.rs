//! Daily broadcast — outbound formatting and the fan-out loop.
//!
//! The dispatcher resolves the day's message exactly once, formats it
//! exactly once, then walks the eligible subscriber list sequentially.
//! Each recipient is isolated: a failed send is counted and logged, never
//! allowed to abort the run.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use tracing::{debug, info, warn};

use crate::catalog::Message;
use crate::channels::ChannelSender;
use crate::error::{ChannelError, Result};
use crate::selector::DailySelector;
use crate::store::{Direction, Store, Subscriber};

// ── Formatting ──────────────────────────────────────────────────────

/// Presentation knobs shared by the dispatcher and admin previews.
#[derive(Debug, Clone)]
pub struct BroadcastStyle {
    /// Product name used in the daily header.
    pub brand: String,
    /// Footer lines rotated under inspiration/intervention messages.
    pub footers: Vec<String>,
}

impl Default for BroadcastStyle {
    fn default() -> Self {
        Self {
            brand: crate::config::DEFAULT_BRAND.to_string(),
            footers: crate::config::default_footers(),
        }
    }
}

/// Render the outbound body for `message` on `date`.
///
/// Interactive messages show only the header and the public trigger text —
/// no author, no footer. Everything else gets the full treatment: optional
/// prepend, optional quoting, attribution, and the day's footer line.
pub fn format_daily(message: &Message, date: NaiveDate, style: &BroadcastStyle) -> String {
    let header = format!("{} — {}", style.brand, date.format("%B %-d"));

    if message.is_interactive() {
        let prompt = message
            .trigger
            .as_ref()
            .map(|t| t.text.as_str())
            .unwrap_or_default();
        return format!("{header}\n\n{prompt}");
    }

    let mut body = message.prepend.clone().unwrap_or_default();
    if message.quoted {
        body.push('"');
        body.push_str(&message.text);
        body.push('"');
    } else {
        body.push_str(&message.text);
    }
    if let Some(author) = &message.author {
        body.push_str("\n— ");
        body.push_str(author);
    }

    match footer_for(date, &style.footers) {
        Some(footer) => format!("{header}\n\n{body}\n\n🌀 {footer}"),
        None => format!("{header}\n\n{body}"),
    }
}

/// The footer line for `date`, cycling through the configured list by
/// day of year.
fn footer_for<'a>(date: NaiveDate, footers: &'a [String]) -> Option<&'a str> {
    if footers.is_empty() {
        return None;
    }
    let idx = date.ordinal0() as usize % footers.len();
    Some(&footers[idx])
}

// ── Dispatcher ──────────────────────────────────────────────────────

/// Outcome of one broadcast run. Partial failure is reported, not raised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub success: usize,
    pub failed: usize,
}

pub struct BroadcastDispatcher {
    selector: Arc<DailySelector>,
    store: Arc<dyn Store>,
    senders: Vec<Arc<dyn ChannelSender>>,
    style: BroadcastStyle,
    /// Pause between recipient sends, to stay under provider rate limits.
    send_delay: Duration,
}

impl BroadcastDispatcher {
    pub fn new(
        selector: Arc<DailySelector>,
        store: Arc<dyn Store>,
        senders: Vec<Arc<dyn ChannelSender>>,
        style: BroadcastStyle,
        send_delay: Duration,
    ) -> Self {
        Self {
            selector,
            store,
            senders,
            style,
            send_delay,
        }
    }

    fn sender_for(&self, channel: &str) -> Option<&Arc<dyn ChannelSender>> {
        self.senders.iter().find(|s| s.name() == channel)
    }

    /// Run the daily broadcast for `date`.
    ///
    /// Fails only when the run cannot proceed at all: selection yields no
    /// message or the subscriber list is unreadable.
    pub async fn broadcast_today(&self, date: NaiveDate) -> Result<BroadcastReport> {
        let message = self.selector.select_for_today(date).await?;
        let body = format_daily(&message, date, &self.style);
        let subscribers = self.store.subscribers_for_broadcast().await?;

        info!(
            message_id = message.id,
            kind = message.kind.as_str(),
            recipients = subscribers.len(),
            "Starting daily broadcast"
        );

        let mut report = BroadcastReport::default();
        for subscriber in &subscribers {
            if subscriber.last_sent_date == Some(date) {
                debug!(address = %subscriber.address, "Already sent today; skipping");
                continue;
            }

            match self.send_one(subscriber, &body, date).await {
                Ok(()) => report.success += 1,
                Err(e) => {
                    warn!(
                        address = %subscriber.address,
                        channel = %subscriber.channel,
                        error = %e,
                        "Send failed; continuing with remaining recipients"
                    );
                    report.failed += 1;
                }
            }

            if !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }
        }

        info!(
            success = report.success,
            failed = report.failed,
            "Daily broadcast complete"
        );
        Ok(report)
    }

    async fn send_one(
        &self,
        subscriber: &Subscriber,
        body: &str,
        date: NaiveDate,
    ) -> std::result::Result<(), ChannelError> {
        let sender = self
            .sender_for(&subscriber.channel)
            .ok_or_else(|| ChannelError::NoSender {
                channel: subscriber.channel.clone(),
            })?;
        sender.send(&subscriber.address, body).await?;

        // The message is already on the wire; bookkeeping failures are
        // logged, not propagated.
        if let Err(e) = self.store.set_last_sent_date(&subscriber.address, date).await {
            warn!(address = %subscriber.address, error = %e, "Failed to record last-sent date");
        }
        if let Err(e) = self
            .store
            .append_conversation(&subscriber.address, Direction::Outbound, body)
            .await
        {
            warn!(address = %subscriber.address, error = %e, "Failed to append conversation log");
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MessageCatalog, MessageKind, Trigger, TriggerResponse};
    use crate::store::LibSqlStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn style() -> BroadcastStyle {
        BroadcastStyle {
            brand: "Dayline".into(),
            footers: vec!["Text HELP for commands.".into()],
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 7).unwrap()
    }

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

    fn interactive(id: u32) -> Message {
        Message {
            id,
            kind: MessageKind::Interactive,
            text: String::new(),
            author: Some("should not appear".into()),
            prepend: None,
            quoted: false,
            trigger: Some(Trigger {
                keyword: "WTF".into(),
                text: "Text WTF for X".into(),
            }),
            response: Some(TriggerResponse {
                text: "Y".into(),
                author: Some("AF".into()),
            }),
        }
    }

    // ── Formatting ──────────────────────────────────────────────────

    #[test]
    fn inspiration_includes_author_and_footer() {
        let mut msg = inspiration(1, "Stay hungry.");
        msg.author = Some("Steve".into());

        let rendered = format_daily(&msg, date(), &style());
        assert_eq!(
            rendered,
            "Dayline — August 7\n\nStay hungry.\n— Steve\n\n🌀 Text HELP for commands."
        );
    }

    #[test]
    fn intervention_includes_footer() {
        let mut msg = inspiration(1, "Put the phone down.");
        msg.kind = MessageKind::Intervention;

        let rendered = format_daily(&msg, date(), &style());
        assert!(rendered.contains("🌀"));
    }

    #[test]
    fn interactive_renders_prompt_only() {
        let rendered = format_daily(&interactive(61), date(), &style());
        assert_eq!(rendered, "Dayline — August 7\n\nText WTF for X");
        assert!(!rendered.contains("🌀"));
        assert!(!rendered.contains("should not appear"));
    }

    #[test]
    fn prepend_and_quotes_wrap_the_body() {
        let mut msg = inspiration(1, "Do the thing");
        msg.prepend = Some("Real talk: ".into());
        msg.quoted = true;

        let rendered = format_daily(&msg, date(), &style());
        assert!(rendered.contains("Real talk: \"Do the thing\""));
    }

    #[test]
    fn footer_rotates_by_day_of_year() {
        let footers = vec!["one".to_string(), "two".to_string()];
        let jan1 = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let jan2 = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        assert_eq!(footer_for(jan1, &footers), Some("one"));
        assert_eq!(footer_for(jan2, &footers), Some("two"));
    }

    #[test]
    fn empty_footer_list_omits_footer_block() {
        let msg = inspiration(1, "text");
        let bare = BroadcastStyle {
            brand: "Dayline".into(),
            footers: vec![],
        };
        assert!(!format_daily(&msg, date(), &bare).contains("🌀"));
    }

    // ── Dispatch ────────────────────────────────────────────────────

    /// Records sends; addresses listed in `fail` error out.
    struct MockSender {
        channel: &'static str,
        sent: Mutex<Vec<(String, String)>>,
        fail: Vec<String>,
    }

    impl MockSender {
        fn new(channel: &'static str) -> Self {
            Self {
                channel,
                sent: Mutex::new(Vec::new()),
                fail: Vec::new(),
            }
        }

        fn failing(channel: &'static str, addresses: &[&str]) -> Self {
            Self {
                channel,
                sent: Mutex::new(Vec::new()),
                fail: addresses.iter().map(|s| s.to_string()).collect(),
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChannelSender for MockSender {
        fn name(&self) -> &str {
            self.channel
        }

        async fn send(&self, address: &str, body: &str) -> std::result::Result<(), ChannelError> {
            if self.fail.iter().any(|a| a == address) {
                return Err(ChannelError::SendFailed {
                    channel: self.channel.into(),
                    reason: "simulated outage".into(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((address.to_string(), body.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        dispatcher: BroadcastDispatcher,
        store: Arc<LibSqlStore>,
        sms: Arc<MockSender>,
    }

    async fn fixture(sms: MockSender, subscribers: &[Subscriber]) -> Fixture {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        for sub in subscribers {
            store.upsert_subscriber(sub).await.unwrap();
        }

        let catalog = Arc::new(
            MessageCatalog::new(vec![
                inspiration(1, "A"),
                {
                    let mut m = inspiration(2, "B");
                    m.kind = MessageKind::Intervention;
                    m
                },
                interactive(61),
            ])
            .unwrap(),
        );
        let epoch = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let selector = Arc::new(DailySelector::new(
            catalog,
            store.clone() as Arc<dyn Store>,
            epoch,
        ));

        let sms = Arc::new(sms);
        let dispatcher = BroadcastDispatcher::new(
            selector,
            store.clone() as Arc<dyn Store>,
            vec![sms.clone() as Arc<dyn ChannelSender>],
            style(),
            Duration::ZERO,
        );
        Fixture {
            dispatcher,
            store,
            sms,
        }
    }

    fn subs(n: usize) -> Vec<Subscriber> {
        (0..n)
            .map(|i| Subscriber::new(&format!("+1555000{i:04}"), "sms"))
            .collect()
    }

    #[tokio::test]
    async fn broadcast_reaches_every_eligible_subscriber() {
        let fx = fixture(MockSender::new("sms"), &subs(3)).await;
        let report = fx.dispatcher.broadcast_today(date()).await.unwrap();

        assert_eq!(report, BroadcastReport { success: 3, failed: 0 });
        assert_eq!(fx.sms.sent().len(), 3);

        // Everyone got the identical body.
        let sent = fx.sms.sent();
        assert!(sent.iter().all(|(_, body)| body == &sent[0].1));
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_run() {
        let fx = fixture(
            MockSender::failing("sms", &["+15550000001"]),
            &subs(4),
        )
        .await;
        let report = fx.dispatcher.broadcast_today(date()).await.unwrap();

        assert_eq!(report, BroadcastReport { success: 3, failed: 1 });
        assert_eq!(fx.sms.sent().len(), 3);
    }

    #[tokio::test]
    async fn rerun_same_day_sends_nothing_twice() {
        let fx = fixture(MockSender::new("sms"), &subs(2)).await;

        let first = fx.dispatcher.broadcast_today(date()).await.unwrap();
        assert_eq!(first.success, 2);

        let second = fx.dispatcher.broadcast_today(date()).await.unwrap();
        assert_eq!(second, BroadcastReport { success: 0, failed: 0 });
        assert_eq!(fx.sms.sent().len(), 2);
    }

    #[tokio::test]
    async fn failed_recipient_is_retried_on_rerun() {
        let fx = fixture(
            MockSender::failing("sms", &["+15550000000"]),
            &subs(2),
        )
        .await;

        let first = fx.dispatcher.broadcast_today(date()).await.unwrap();
        assert_eq!(first, BroadcastReport { success: 1, failed: 1 });

        // The failed recipient has no last-sent marker, so a rerun picks
        // them up again (and only them).
        let second = fx.dispatcher.broadcast_today(date()).await.unwrap();
        assert_eq!(second.failed, 1);
        assert_eq!(second.success, 0);
    }

    #[tokio::test]
    async fn subscriber_on_unconfigured_channel_counts_as_failure() {
        let mut list = subs(1);
        list.push(Subscriber::new("person@example.com", "email"));

        let fx = fixture(MockSender::new("sms"), &list).await;
        let report = fx.dispatcher.broadcast_today(date()).await.unwrap();
        assert_eq!(report, BroadcastReport { success: 1, failed: 1 });
    }

    #[tokio::test]
    async fn successful_send_records_last_sent_date() {
        let fx = fixture(MockSender::new("sms"), &subs(1)).await;
        fx.dispatcher.broadcast_today(date()).await.unwrap();

        let sub = fx
            .store
            .get_subscriber("+15550000000")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.last_sent_date, Some(date()));
    }

    #[tokio::test]
    async fn broadcast_fails_outright_with_no_rotation_pool() {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        store
            .upsert_subscriber(&Subscriber::new("+15550000000", "sms"))
            .await
            .unwrap();

        let catalog = Arc::new(MessageCatalog::new(vec![interactive(61)]).unwrap());
        let epoch = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let selector = Arc::new(DailySelector::new(
            catalog,
            store.clone() as Arc<dyn Store>,
            epoch,
        ));
        let dispatcher = BroadcastDispatcher::new(
            selector,
            store as Arc<dyn Store>,
            vec![Arc::new(MockSender::new("sms")) as Arc<dyn ChannelSender>],
            style(),
            Duration::ZERO,
        );

        assert!(dispatcher.broadcast_today(date()).await.is_err());
    }
}
