//! libSQL backend — async `Store` trait implementation.
//!
//! Supports local file and in-memory databases. Interactive messages are
//! stored flattened (trigger/response in their own columns) and rebuilt
//! into the nested catalog shape on load.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::{Message, MessageKind, Trigger, TriggerResponse};
use crate::error::StoreError;
use crate::store::traits::{Direction, OverrideEntry, Store, Subscriber};

/// libSQL store backend.
///
/// Holds a single connection reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Open(format!("Failed to create store directory: {e}")))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        const TABLES: &[&str] = &[
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY,
                kind TEXT NOT NULL,
                text TEXT NOT NULL DEFAULT '',
                author TEXT,
                prepend TEXT,
                quoted INTEGER NOT NULL DEFAULT 0,
                trigger_keyword TEXT,
                trigger_text TEXT,
                response_text TEXT,
                response_author TEXT
            )",
            "CREATE TABLE IF NOT EXISTS subscribers (
                address TEXT PRIMARY KEY,
                channel TEXT NOT NULL DEFAULT 'sms',
                confirmed INTEGER NOT NULL DEFAULT 0,
                unsubscribed INTEGER NOT NULL DEFAULT 0,
                is_admin INTEGER NOT NULL DEFAULT 0,
                consent_given INTEGER NOT NULL DEFAULT 0,
                last_sent_date TEXT,
                opted_in_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS override_queue (
                id TEXT PRIMARY KEY,
                message_id INTEGER NOT NULL,
                requested_by TEXT NOT NULL,
                consumed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS conversation_log (
                id TEXT PRIMARY KEY,
                address TEXT NOT NULL,
                direction TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        ];

        for sql in TABLES {
            self.conn()
                .execute(sql, ())
                .await
                .map_err(|e| StoreError::Migration(e.to_string()))?;
        }
        Ok(())
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 timestamp; unparseable values collapse to the epoch
/// floor instead of failing the whole row.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Convert `Option<&str>` to a libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map a libsql row to a catalog `Message`, rebuilding the nested
/// trigger/response shape for interactive rows.
fn row_to_catalog_message(row: &libsql::Row) -> Result<Message, libsql::Error> {
    let id: i64 = row.get(0)?;
    let kind_str: String = row.get(1)?;
    let kind = MessageKind::from_str_lossy(&kind_str);

    let trigger = match (row.get::<String>(6).ok(), row.get::<String>(7).ok()) {
        (Some(keyword), Some(text)) => Some(Trigger { keyword, text }),
        _ => None,
    };
    let response = row.get::<String>(8).ok().map(|text| TriggerResponse {
        text,
        author: row.get(9).ok(),
    });

    Ok(Message {
        id: id as u32,
        kind,
        text: row.get(2)?,
        author: row.get(3).ok(),
        prepend: row.get(4).ok(),
        quoted: row.get::<i64>(5)? != 0,
        trigger: if kind == MessageKind::Interactive {
            trigger
        } else {
            None
        },
        response: if kind == MessageKind::Interactive {
            response
        } else {
            None
        },
    })
}

fn row_to_subscriber(row: &libsql::Row) -> Result<Subscriber, libsql::Error> {
    let last_sent_str: Option<String> = row.get(6).ok();
    let opted_in_str: String = row.get(7)?;

    Ok(Subscriber {
        address: row.get(0)?,
        channel: row.get(1)?,
        confirmed: row.get::<i64>(2)? != 0,
        unsubscribed: row.get::<i64>(3)? != 0,
        is_admin: row.get::<i64>(4)? != 0,
        consent_given: row.get::<i64>(5)? != 0,
        last_sent_date: last_sent_str.as_deref().and_then(parse_date),
        opted_in_at: parse_datetime(&opted_in_str),
    })
}

fn row_to_override(row: &libsql::Row) -> Result<OverrideEntry, StoreError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| StoreError::Query(format!("override row: {e}")))?;
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| StoreError::Query(format!("override id parse: {e}")))?;
    let message_id: i64 = row
        .get(1)
        .map_err(|e| StoreError::Query(format!("override row: {e}")))?;
    let requested_by: String = row
        .get(2)
        .map_err(|e| StoreError::Query(format!("override row: {e}")))?;
    let consumed: i64 = row
        .get(3)
        .map_err(|e| StoreError::Query(format!("override row: {e}")))?;
    let created_str: String = row
        .get(4)
        .map_err(|e| StoreError::Query(format!("override row: {e}")))?;

    Ok(OverrideEntry {
        id,
        message_id: message_id as u32,
        requested_by,
        consumed: consumed != 0,
        created_at: parse_datetime(&created_str),
    })
}

const MESSAGE_COLUMNS: &str = "id, kind, text, author, prepend, quoted, \
     trigger_keyword, trigger_text, response_text, response_author";

const SUBSCRIBER_COLUMNS: &str = "address, channel, confirmed, unsubscribed, \
     is_admin, consent_given, last_sent_date, opted_in_at";

const OVERRIDE_COLUMNS: &str = "id, message_id, requested_by, consumed, created_at";

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Store for LibSqlStore {
    async fn load_messages(&self) -> Result<Vec<Message>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY id ASC"),
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("load_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let msg = row_to_catalog_message(&row)
                .map_err(|e| StoreError::Query(format!("load_messages row parse: {e}")))?;
            messages.push(msg);
        }
        debug!(count = messages.len(), "Catalog messages loaded");
        Ok(messages)
    }

    async fn insert_message(&self, message: &Message) -> Result<(), StoreError> {
        let (trigger_keyword, trigger_text) = match &message.trigger {
            Some(t) => (Some(t.keyword.as_str()), Some(t.text.as_str())),
            None => (None, None),
        };
        let (response_text, response_author) = match &message.response {
            Some(r) => (Some(r.text.as_str()), r.author.as_deref()),
            None => (None, None),
        };

        self.conn()
            .execute(
                "INSERT INTO messages (id, kind, text, author, prepend, quoted,
                    trigger_keyword, trigger_text, response_text, response_author)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    message.id as i64,
                    message.kind.as_str(),
                    message.text.as_str(),
                    opt_text(message.author.as_deref()),
                    opt_text(message.prepend.as_deref()),
                    i64::from(message.quoted),
                    opt_text(trigger_keyword),
                    opt_text(trigger_text),
                    opt_text(response_text),
                    opt_text(response_author),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("insert_message: {e}")))?;
        Ok(())
    }

    async fn upsert_subscriber(&self, subscriber: &Subscriber) -> Result<(), StoreError> {
        let last_sent = subscriber
            .last_sent_date
            .map(|d| d.format("%Y-%m-%d").to_string());

        self.conn()
            .execute(
                "INSERT INTO subscribers (address, channel, confirmed, unsubscribed,
                    is_admin, consent_given, last_sent_date, opted_in_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(address) DO UPDATE SET
                    channel = excluded.channel,
                    confirmed = excluded.confirmed,
                    unsubscribed = excluded.unsubscribed,
                    is_admin = excluded.is_admin,
                    consent_given = excluded.consent_given,
                    last_sent_date = excluded.last_sent_date",
                params![
                    subscriber.address.as_str(),
                    subscriber.channel.as_str(),
                    i64::from(subscriber.confirmed),
                    i64::from(subscriber.unsubscribed),
                    i64::from(subscriber.is_admin),
                    i64::from(subscriber.consent_given),
                    opt_text(last_sent.as_deref()),
                    subscriber.opted_in_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("upsert_subscriber: {e}")))?;
        Ok(())
    }

    async fn get_subscriber(&self, address: &str) -> Result<Option<Subscriber>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SUBSCRIBER_COLUMNS} FROM subscribers WHERE address = ?1"),
                params![address],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_subscriber: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let sub = row_to_subscriber(&row)
                    .map_err(|e| StoreError::Query(format!("get_subscriber row parse: {e}")))?;
                Ok(Some(sub))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get_subscriber: {e}"))),
        }
    }

    async fn subscribers_for_broadcast(&self) -> Result<Vec<Subscriber>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SUBSCRIBER_COLUMNS} FROM subscribers
                     WHERE confirmed = 1 AND unsubscribed = 0
                     ORDER BY opted_in_at ASC, address ASC"
                ),
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("subscribers_for_broadcast: {e}")))?;

        let mut subscribers = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_subscriber(&row) {
                Ok(sub) => subscribers.push(sub),
                Err(e) => {
                    tracing::warn!("Skipping subscriber row: {e}");
                }
            }
        }
        Ok(subscribers)
    }

    async fn set_unsubscribed(&self, address: &str) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "UPDATE subscribers SET unsubscribed = 1 WHERE address = ?1",
                params![address],
            )
            .await
            .map_err(|e| StoreError::Query(format!("set_unsubscribed: {e}")))?;
        debug!(address, "Subscriber opted out");
        Ok(())
    }

    async fn set_last_sent_date(&self, address: &str, date: NaiveDate) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "UPDATE subscribers SET last_sent_date = ?1 WHERE address = ?2",
                params![date.format("%Y-%m-%d").to_string(), address],
            )
            .await
            .map_err(|e| StoreError::Query(format!("set_last_sent_date: {e}")))?;
        Ok(())
    }

    async fn enqueue_override(
        &self,
        message_id: u32,
        requested_by: &str,
    ) -> Result<OverrideEntry, StoreError> {
        let entry = OverrideEntry {
            id: Uuid::new_v4(),
            message_id,
            requested_by: requested_by.to_string(),
            consumed: false,
            created_at: Utc::now(),
        };

        self.conn()
            .execute(
                "INSERT INTO override_queue (id, message_id, requested_by, consumed, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                params![
                    entry.id.to_string(),
                    entry.message_id as i64,
                    entry.requested_by.as_str(),
                    entry.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("enqueue_override: {e}")))?;

        debug!(message_id, requested_by, "Override entry queued");
        Ok(entry)
    }

    async fn oldest_unconsumed_override(&self) -> Result<Option<OverrideEntry>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {OVERRIDE_COLUMNS} FROM override_queue
                     WHERE consumed = 0
                     ORDER BY created_at ASC, rowid ASC
                     LIMIT 1"
                ),
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("oldest_unconsumed_override: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_override(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!(
                "oldest_unconsumed_override: {e}"
            ))),
        }
    }

    async fn mark_override_consumed(&self, id: Uuid) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "UPDATE override_queue SET consumed = 1 WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("mark_override_consumed: {e}")))?;
        Ok(())
    }

    async fn pending_override_count(&self) -> Result<usize, StoreError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM override_queue WHERE consumed = 0", ())
            .await
            .map_err(|e| StoreError::Query(format!("pending_override_count: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("pending_override_count: {e}")))?;
                Ok(count.max(0) as usize)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(StoreError::Query(format!("pending_override_count: {e}"))),
        }
    }

    async fn append_conversation(
        &self,
        address: &str,
        direction: Direction,
        body: &str,
    ) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO conversation_log (id, address, direction, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    Uuid::new_v4().to_string(),
                    address,
                    direction.as_str(),
                    body,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("append_conversation: {e}")))?;
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
