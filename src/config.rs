//! Engine configuration, loaded from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;

use crate::error::ConfigError;

/// Product name used in the daily header when none is configured.
pub const DEFAULT_BRAND: &str = "Dayline";

/// Footer lines rotated under inspiration/intervention messages when none
/// are configured.
pub fn default_footers() -> Vec<String> {
    vec![
        "Text HELP for commands.".to_string(),
        "Forward this to someone who needs it today.".to_string(),
        "Reply STOP any time to unsubscribe.".to_string(),
    ]
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Product name used in the daily header.
    pub brand: String,
    /// Reference date for the day-indexed rotation.
    pub epoch: NaiveDate,
    /// Cron expression (seconds-resolution) for the daily broadcast.
    pub broadcast_schedule: String,
    /// Pause between recipient sends during a broadcast.
    pub send_delay: Duration,
    /// Footer lines rotated under inspiration/intervention messages.
    pub footers: Vec<String>,
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// JSON file used to seed the catalog when the message table is empty.
    pub seed_path: PathBuf,
    /// Bind address for the inbound webhook server.
    pub bind_addr: SocketAddr,
}

impl EngineConfig {
    /// Build config from environment variables, validating everything
    /// that would otherwise fail at an awkward time.
    pub fn from_env() -> Result<Self, ConfigError> {
        let brand = std::env::var("DAYLINE_BRAND").unwrap_or_else(|_| DEFAULT_BRAND.to_string());

        let epoch_str =
            std::env::var("DAYLINE_EPOCH").unwrap_or_else(|_| "2024-01-01".to_string());
        let epoch = parse_epoch(&epoch_str)?;

        let broadcast_schedule = std::env::var("DAYLINE_BROADCAST_CRON")
            .unwrap_or_else(|_| "0 0 9 * * *".to_string());
        // Validate now; the scheduler parses it again at spawn time.
        cron::Schedule::from_str(&broadcast_schedule).map_err(|e| ConfigError::InvalidValue {
            key: "DAYLINE_BROADCAST_CRON".into(),
            message: e.to_string(),
        })?;

        let send_delay_ms: u64 = std::env::var("DAYLINE_SEND_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(500);

        let footers = match std::env::var("DAYLINE_FOOTERS") {
            Ok(raw) => parse_footers(&raw),
            Err(_) => default_footers(),
        };

        let db_path = PathBuf::from(
            std::env::var("DAYLINE_DB_PATH").unwrap_or_else(|_| "./data/dayline.db".to_string()),
        );

        let seed_path = PathBuf::from(
            std::env::var("DAYLINE_SEED_PATH")
                .unwrap_or_else(|_| "./data/messages.json".to_string()),
        );

        let bind_str =
            std::env::var("DAYLINE_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let bind_addr = bind_str.parse().map_err(|_| ConfigError::InvalidValue {
            key: "DAYLINE_BIND".into(),
            message: format!("{bind_str:?} is not a socket address"),
        })?;

        Ok(Self {
            brand,
            epoch,
            broadcast_schedule,
            send_delay: Duration::from_millis(send_delay_ms),
            footers,
            db_path,
            seed_path,
            bind_addr,
        })
    }
}

/// Parse the rotation epoch (`YYYY-MM-DD`).
fn parse_epoch(s: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| ConfigError::InvalidValue {
        key: "DAYLINE_EPOCH".into(),
        message: format!("{s:?} is not a YYYY-MM-DD date"),
    })
}

/// Split a `|`-separated footer list, dropping empty segments.
fn parse_footers(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ── Tests ───────────────────────────────────────────────────────────
