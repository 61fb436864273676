//! Game score record model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// Entity type tracked by checkpoints and conflicts for score records.
pub const GAME_SCORE_ENTITY: &str = "game_score";

/// A unique identifier for a score record, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Sync lifecycle of a score record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Waiting to be uploaded
    Pending,
    /// Acknowledged by the server
    Synced,
    /// Diverged from the server copy, waiting for resolution
    Conflict,
    /// Rejected too many times; surfaced to the operator
    Error,
}

impl SyncStatus {
    pub const ALL: [Self; 4] = [Self::Pending, Self::Synced, Self::Conflict, Self::Error];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Synced => "SYNCED",
            Self::Conflict => "CONFLICT",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "SYNCED" => Ok(Self::Synced),
            "CONFLICT" => Ok(Self::Conflict),
            "ERROR" => Ok(Self::Error),
            other => Err(Error::InvalidInput(format!("unknown sync status '{other}'"))),
        }
    }
}

/// The mutable part of a score record.
///
/// Everything here feeds the content hash; identity and sync metadata do not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorePayload {
    pub score: i64,
    pub max_score: i64,
    pub correct_answers: u32,
    pub total_questions: u32,
    /// Time spent in the game session (ms)
    pub duration_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    /// Client-side custom metadata. Keys the server does not know about are
    /// merged rather than overwritten during conflict resolution.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ScorePayload {
    /// Hex-encoded BLAKE3 digest of the canonical JSON encoding.
    pub fn content_hash(&self) -> String {
        // Struct fields serialize in declaration order and BTreeMap keys are
        // sorted, so the encoding is canonical.
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&encoded).to_hex().to_string()
    }

    /// Score as a percentage of the maximum, if the maximum is positive.
    #[allow(clippy::cast_precision_loss)]
    pub fn percentage(&self) -> Option<f64> {
        (self.max_score > 0).then(|| self.score as f64 * 100.0 / self.max_score as f64)
    }
}

/// One gameplay outcome queued for upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameScoreRecord {
    /// Stable identifier, never reassigned
    pub id: RecordId,
    pub owner_id: String,
    pub game_id: String,
    pub payload: ScorePayload,
    /// When the game was played (Unix ms)
    pub played_at: i64,
    pub device_id: String,
    /// Starts at 1, +1 per local mutation
    pub local_version: i64,
    /// Last version acknowledged by the server, 0 until first ack
    pub server_version: i64,
    /// Server version observed while the record is in conflict
    pub remote_version: Option<i64>,
    /// Last local mutation (Unix ms)
    pub modified_at: i64,
    pub content_hash: String,
    pub sync_status: SyncStatus,
    pub sync_attempts: u32,
    pub last_sync_error: Option<String>,
}

impl GameScoreRecord {
    /// Create a fresh, never-synced record for a completed game.
    #[must_use]
    pub fn new(
        owner_id: impl Into<String>,
        game_id: impl Into<String>,
        device_id: impl Into<String>,
        payload: ScorePayload,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let content_hash = payload.content_hash();
        Self {
            id: RecordId::new(),
            owner_id: owner_id.into(),
            game_id: game_id.into(),
            payload,
            played_at: now,
            device_id: device_id.into(),
            local_version: 1,
            server_version: 0,
            remote_version: None,
            modified_at: now,
            content_hash,
            sync_status: SyncStatus::Pending,
            sync_attempts: 0,
            last_sync_error: None,
        }
    }

    /// Override the event time (e.g. when importing a game played earlier).
    #[must_use]
    pub const fn played_at(mut self, played_at: i64) -> Self {
        self.played_at = played_at;
        self
    }

    /// True while the server has not seen the latest local state.
    pub const fn has_unsynced_changes(&self) -> bool {
        self.local_version > self.server_version
            || matches!(self.sync_status, SyncStatus::Pending | SyncStatus::Conflict)
    }

    /// Recompute the content hash from the current payload.
    pub fn refresh_hash(&mut self) {
        self.content_hash = self.payload.content_hash();
    }
}

/// Record state decided by a conflict resolution, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRecord {
    pub payload: ScorePayload,
    pub local_version: i64,
    pub server_version: i64,
    pub status: SyncStatus,
}
