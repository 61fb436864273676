//! Sync checkpoint model

use serde::{Deserialize, Serialize};

/// Per entity type cursor marking the last fully committed sync round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub entity_type: String,
    /// Greatest `modified_at` covered by the last committed round (Unix ms)
    pub last_sync_timestamp: Option<i64>,
    /// Monotonic round counter, 0 before the first committed round
    pub last_sync_version: i64,
    /// Opaque ordering token handed back by the server
    pub server_sequence_id: Option<String>,
    pub updated_at: i64,
}

impl SyncCheckpoint {
    /// Zero-state checkpoint for an entity type.
    #[must_use]
    pub fn initial(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            last_sync_timestamp: None,
            last_sync_version: 0,
            server_sequence_id: None,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// True when no round has ever committed (or after a reset).
    pub const fn is_initial(&self) -> bool {
        self.last_sync_timestamp.is_none() && self.last_sync_version == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_checkpoint() {
        let checkpoint = SyncCheckpoint::initial("game_score");
        assert!(checkpoint.is_initial());
        assert_eq!(checkpoint.entity_type, "game_score");
    }

    #[test]
    fn test_advanced_checkpoint_is_not_initial() {
        let mut checkpoint = SyncCheckpoint::initial("game_score");
        checkpoint.last_sync_version = 1;
        assert!(!checkpoint.is_initial());

        let mut checkpoint = SyncCheckpoint::initial("game_score");
        checkpoint.last_sync_timestamp = Some(1_700_000_000_000);
        assert!(!checkpoint.is_initial());
    }
}
