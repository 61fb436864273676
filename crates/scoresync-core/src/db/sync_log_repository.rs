//! Sync history repository implementation

use crate::error::{Error, Result};
use crate::models::{RoundSummary, SyncLog, SyncType};
use crate::util::unix_millis_days_ago;
use rusqlite::{params, Connection, OptionalExtension};

use super::{limit_param, Database};

/// Storage port for per-round sync history
pub trait SyncLogStore: Send + Sync {
    /// Open a log row for a round that is starting now
    fn start(&self, sync_type: SyncType) -> Result<i64>;

    /// Close a log row with the round's counters.
    ///
    /// Returns `false` if the row had already been completed; a log row is
    /// written to at most once after it starts.
    fn complete(&self, id: i64, summary: &RoundSummary) -> Result<bool>;

    /// Get a log row by ID
    fn get(&self, id: i64) -> Result<Option<SyncLog>>;

    /// Most recent rounds, newest first
    fn recent(&self, limit: usize) -> Result<Vec<SyncLog>>;

    /// The most recently started round, if any
    fn last(&self) -> Result<Option<SyncLog>>;

    /// The most recently completed round, if any
    fn last_completed(&self) -> Result<Option<SyncLog>>;

    /// Delete completed rows started more than `older_than_days` ago
    fn prune(&self, older_than_days: u32) -> Result<usize>;
}

const LOG_COLUMNS: &str = "id, sync_started_at, sync_completed_at, sync_type, scores_uploaded,
    scores_failed, bytes_transferred, success, error_message, conflicts_detected, conflicts_resolved";

/// `SQLite` implementation of `SyncLogStore`
#[derive(Debug, Clone)]
pub struct SqliteSyncLogRepository {
    db: Database,
}

impl SqliteSyncLogRepository {
    /// Create a new repository over the given database
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    fn parse_log(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncLog> {
        let sync_type: String = row.get(3)?;
        let bytes: i64 = row.get(6)?;
        Ok(SyncLog {
            id: row.get(0)?,
            sync_started_at: row.get(1)?,
            sync_completed_at: row.get(2)?,
            sync_type: sync_type.parse().map_err(|e: Error| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
            scores_uploaded: row.get(4)?,
            scores_failed: row.get(5)?,
            bytes_transferred: u64::try_from(bytes).unwrap_or_default(),
            success: row.get(7)?,
            error_message: row.get(8)?,
            conflicts_detected: row.get(9)?,
            conflicts_resolved: row.get(10)?,
        })
    }

    fn query_logs(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<SyncLog>> {
        let mut stmt = conn.prepare(sql)?;
        let logs = stmt
            .query_map(params, Self::parse_log)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    fn query_one(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Option<SyncLog>> {
        Ok(conn.query_row(sql, params, Self::parse_log).optional()?)
    }
}

impl SyncLogStore for SqliteSyncLogRepository {
    fn start(&self, sync_type: SyncType) -> Result<i64> {
        let now = chrono::Utc::now().timestamp_millis();
        self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO sync_logs (sync_started_at, sync_type) VALUES (?, ?)",
                params![now, sync_type.as_str()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn complete(&self, id: i64, summary: &RoundSummary) -> Result<bool> {
        let now = chrono::Utc::now().timestamp_millis();
        let bytes = i64::try_from(summary.bytes_transferred).unwrap_or(i64::MAX);
        let rows = self.db.with_connection(|conn| {
            Ok(conn.execute(
                "UPDATE sync_logs SET
                    sync_completed_at = ?, scores_uploaded = ?, scores_failed = ?,
                    bytes_transferred = ?, success = ?, error_message = ?,
                    conflicts_detected = ?, conflicts_resolved = ?
                 WHERE id = ? AND sync_completed_at IS NULL",
                params![
                    now,
                    summary.scores_uploaded,
                    summary.scores_failed,
                    bytes,
                    summary.success,
                    summary.error_message,
                    summary.conflicts_detected,
                    summary.conflicts_resolved,
                    id,
                ],
            )?)
        })?;

        if rows == 0 {
            tracing::warn!("Sync log {id} was already completed or does not exist");
        }
        Ok(rows > 0)
    }

    fn get(&self, id: i64) -> Result<Option<SyncLog>> {
        self.db.with_connection(|conn| {
            Self::query_one(
                conn,
                &format!("SELECT {LOG_COLUMNS} FROM sync_logs WHERE id = ?"),
                params![id],
            )
        })
    }

    fn recent(&self, limit: usize) -> Result<Vec<SyncLog>> {
        self.db.with_connection(|conn| {
            Self::query_logs(
                conn,
                &format!(
                    "SELECT {LOG_COLUMNS} FROM sync_logs
                     ORDER BY sync_started_at DESC, id DESC
                     LIMIT ?"
                ),
                params![limit_param(limit)],
            )
        })
    }

    fn last(&self) -> Result<Option<SyncLog>> {
        self.db.with_connection(|conn| {
            Self::query_one(
                conn,
                &format!(
                    "SELECT {LOG_COLUMNS} FROM sync_logs
                     ORDER BY sync_started_at DESC, id DESC
                     LIMIT 1"
                ),
                [],
            )
        })
    }

    fn last_completed(&self) -> Result<Option<SyncLog>> {
        self.db.with_connection(|conn| {
            Self::query_one(
                conn,
                &format!(
                    "SELECT {LOG_COLUMNS} FROM sync_logs
                     WHERE sync_completed_at IS NOT NULL
                     ORDER BY sync_completed_at DESC, id DESC
                     LIMIT 1"
                ),
                [],
            )
        })
    }

    fn prune(&self, older_than_days: u32) -> Result<usize> {
        let cutoff = unix_millis_days_ago(older_than_days);
        let removed = self.db.with_connection(|conn| {
            Ok(conn.execute(
                "DELETE FROM sync_logs WHERE sync_completed_at IS NOT NULL AND sync_started_at < ?",
                params![cutoff],
            )?)
        })?;
        if removed > 0 {
            tracing::info!("Pruned {removed} sync log entries older than {older_than_days} days");
        }
        Ok(removed)
    }
}
