use std::io;

use scoresync_core::sync::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] scoresync_core::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Score record ID cannot be empty")]
    EmptyRecordId,
    #[error("Invalid score record ID '{0}'")]
    InvalidRecordId(String),
    #[error("Score record not found: {0}")]
    RecordNotFound(String),
    #[error("Invalid metadata entry '{0}'; expected KEY=VALUE")]
    InvalidMetadata(String),
    #[error("Nothing to change; pass at least one field to edit")]
    NothingToEdit,
    #[error("Conflict {0} is already resolved")]
    AlreadyResolved(i64),
    #[error("Sync round failed: {0}")]
    SyncFailed(String),
    #[error(
        "Score API is not configured. Set api_base_url in the settings file or SCORESYNC_API_URL."
    )]
    ApiNotConfigured,
    #[error("Device is not configured. Set SCORESYNC_DEVICE_ID and SCORESYNC_DEVICE_TOKEN.")]
    DeviceNotConfigured,
    #[error("Configuration error: {0}")]
    Config(String),
}
