//! Upload wire format and the transport port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{GameScoreRecord, RecordId, ScorePayload};

use super::identity::AccessToken;

/// One record as sent to the score API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreUpload {
    pub id: RecordId,
    pub owner_id: String,
    pub game_id: String,
    pub played_at: i64,
    pub device_id: String,
    pub local_version: i64,
    /// Server version this edit was made on top of; 0 for never-synced records
    pub base_version: i64,
    pub content_hash: String,
    pub payload: ScorePayload,
}

impl From<&GameScoreRecord> for ScoreUpload {
    fn from(record: &GameScoreRecord) -> Self {
        Self {
            id: record.id,
            owner_id: record.owner_id.clone(),
            game_id: record.game_id.clone(),
            played_at: record.played_at,
            device_id: record.device_id.clone(),
            local_version: record.local_version,
            base_version: record.server_version,
            content_hash: record.content_hash.clone(),
            payload: record.payload.clone(),
        }
    }
}

/// Request body of a batch upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadBatch {
    pub device_id: String,
    pub scores: Vec<ScoreUpload>,
}

impl UploadBatch {
    pub fn new(device_id: impl Into<String>, records: &[GameScoreRecord]) -> Self {
        Self {
            device_id: device_id.into(),
            scores: records.iter().map(ScoreUpload::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// The server's copy of a record, returned alongside a conflict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerScore {
    pub version: i64,
    pub content_hash: String,
    pub payload: ScorePayload,
    #[serde(default)]
    pub modified_at: Option<i64>,
}

impl ServerScore {
    pub fn new(version: i64, payload: ScorePayload) -> Self {
        Self {
            version,
            content_hash: payload.content_hash(),
            payload,
            modified_at: None,
        }
    }
}

/// Per-record verdict of an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Accepted {
        server_version: i64,
    },
    Conflict {
        /// `None` when the server no longer has the record
        #[serde(default)]
        server: Option<ServerScore>,
    },
    Rejected {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub id: RecordId,
    #[serde(flatten)]
    pub kind: OutcomeKind,
}

impl RecordOutcome {
    pub const fn accepted(id: RecordId, server_version: i64) -> Self {
        Self {
            id,
            kind: OutcomeKind::Accepted { server_version },
        }
    }

    pub const fn conflict(id: RecordId, server: Option<ServerScore>) -> Self {
        Self {
            id,
            kind: OutcomeKind::Conflict { server },
        }
    }

    pub fn rejected(id: RecordId, reason: impl Into<String>) -> Self {
        Self {
            id,
            kind: OutcomeKind::Rejected {
                reason: reason.into(),
            },
        }
    }
}

/// Response body of a batch upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub outcomes: Vec<RecordOutcome>,
    #[serde(default)]
    pub success_count: u32,
    #[serde(default)]
    pub message: Option<String>,
    /// Opaque ordering token, stored on the checkpoint
    #[serde(default)]
    pub sequence_id: Option<String>,
}

/// Round-level transport failures. Always retried on a later round.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Score API unreachable: {0}")]
    Unreachable(String),
    #[error("Score API request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("Score API error: {message}")]
    Api { status: u16, message: String },
    #[error("Invalid score API response: {0}")]
    InvalidResponse(String),
    #[error("Invalid score API configuration: {0}")]
    InvalidConfiguration(String),
}

/// Uploads batches to the score authority.
///
/// Implementations must be idempotent per record id: the engine retries
/// after ambiguous failures and relies on the server to spot duplicates.
#[async_trait]
pub trait ScoreTransport: Send + Sync {
    async fn upload_scores(
        &self,
        token: &AccessToken,
        batch: &UploadBatch,
    ) -> Result<UploadResponse, TransportError>;
}
