//! Data models for scoresync

mod checkpoint;
mod score_record;
mod sync_conflict;
mod sync_log;

pub use checkpoint::SyncCheckpoint;
pub use score_record::{
    GameScoreRecord, RecordId, ResolvedRecord, ScorePayload, SyncStatus, GAME_SCORE_ENTITY,
};
pub use sync_conflict::{ConflictType, NewSyncConflict, Resolution, ResolvedBy, SyncConflict};
pub use sync_log::{RoundSummary, SyncLog, SyncType};
