//! Error types for scoresync-core

use thiserror::Error;

/// Result type alias using scoresync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by local persistence and configuration.
///
/// Every variant is treated by the sync engine as a storage failure: fatal
/// for the current round, never for the process.
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record, checkpoint, or conflict not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),
}
