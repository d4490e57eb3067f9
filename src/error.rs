//! Error types for Dayline.

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors. All of these are fatal at startup — the
/// engine must not reach its scheduled or command-processing state with a
/// broken catalog or channel setup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Message catalog is empty")]
    EmptyCatalog,

    #[error("Duplicate message id {id} in catalog")]
    DuplicateMessageId { id: u32 },

    #[error("Invalid catalog message {id}: {reason}")]
    InvalidMessage { id: u32, reason: String },

    #[error("Trigger keyword {keyword:?} is claimed by both message {first} and message {second}")]
    DuplicateTriggerKeyword {
        keyword: String,
        first: u32,
        second: u32,
    },

    #[error("No channel senders configured")]
    NoChannels,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Schema initialization failed: {0}")]
    Migration(String),
}

/// Catalog lookup errors.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("No message with id {id}")]
    NotFound { id: u32 },

    #[error("Catalog has no messages eligible for daily rotation")]
    NoEligible,
}

/// Outbound channel errors. These are per-recipient values — a failed send
/// is recorded and counted, never allowed to unwind a broadcast run.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send on channel {channel}: {reason}")]
    SendFailed { channel: String, reason: String },

    #[error("Invalid address {address:?} for channel {channel}")]
    InvalidAddress { channel: String, address: String },

    #[error("No sender configured for channel {channel}")]
    NoSender { channel: String },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
