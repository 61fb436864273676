//! Database layer for scoresync

mod checkpoint_repository;
mod conflict_repository;
mod connection;
mod migrations;
mod record_repository;
mod sync_log_repository;

pub use checkpoint_repository::{CheckpointStore, SqliteCheckpointRepository};
pub use conflict_repository::{ConflictStore, SqliteConflictRepository};
pub use connection::Database;
pub use record_repository::{RecordStore, SqliteRecordRepository};
pub use sync_log_repository::{SqliteSyncLogRepository, SyncLogStore};

/// Clamp a caller-supplied row limit into an `SQLite` integer
pub(crate) fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
