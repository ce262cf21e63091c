//! Unified error types.

use thiserror::Error;

/// Top-level market-maker error.
#[derive(Error, Debug)]
pub enum MmError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] WsError),

    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Signing error: {0}")]
    Sign(#[from] SignError),

    #[error("Price feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Wire-protocol client errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Malformed frame: {0}")]
    Frame(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Client shut down")]
    ShutDown,
}

/// Errors applying a patch batch to a snapshot.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatchError {
    #[error("Unknown patch op: {0}")]
    UnknownOp(String),

    #[error("Path not found: /{0}")]
    PathNotFound(String),

    #[error("Cannot index into non-container at /{0}")]
    NotAContainer(String),

    #[error("Array index out of range at /{0}")]
    IndexOutOfRange(String),

    #[error("Malformed patch batch: {0}")]
    Malformed(String),
}

/// Resting-order store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt row {row_id}: {reason}")]
    CorruptRow { row_id: i64, reason: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Order signing errors.
#[derive(Error, Debug)]
pub enum SignError {
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}

/// Price-feed poller errors.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Configuration errors. All are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
