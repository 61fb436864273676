//! Score record repository implementation

use crate::error::{Error, Result};
use crate::models::{GameScoreRecord, RecordId, ResolvedRecord, ScorePayload, SyncStatus};
use rusqlite::{params, Connection, OptionalExtension};

use super::{limit_param, Database};

/// Storage port for queued score records.
///
/// Every mutation touches exactly one record and is atomic on its own.
pub trait RecordStore: Send + Sync {
    /// Queue a newly created record
    fn enqueue(&self, record: &GameScoreRecord) -> Result<()>;

    /// Get a record by ID
    fn get(&self, id: &RecordId) -> Result<Option<GameScoreRecord>>;

    /// Pending records, oldest event time first
    fn find_pending(&self, limit: usize) -> Result<Vec<GameScoreRecord>>;

    /// Pending records changed at or after `timestamp`, plus pending records
    /// with failed attempts, oldest change first
    fn find_pending_since(&self, timestamp: i64, limit: usize) -> Result<Vec<GameScoreRecord>>;

    /// All records in the given status, oldest event time first
    fn find_by_status(&self, status: SyncStatus) -> Result<Vec<GameScoreRecord>>;

    /// Records of any status changed strictly after `timestamp`
    fn find_modified_after(&self, timestamp: i64) -> Result<Vec<GameScoreRecord>>;

    /// Number of records in the given status
    fn count_by_status(&self, status: SyncStatus) -> Result<usize>;

    /// Record a server acknowledgement of `server_version`
    fn mark_synced(&self, id: &RecordId, server_version: i64) -> Result<()>;

    /// Flag divergence, remembering the server version that was observed
    fn mark_conflict(&self, id: &RecordId, server_version: i64) -> Result<()>;

    /// Count a failed attempt and return the new attempt count
    fn increment_attempt(&self, id: &RecordId, error_message: &str) -> Result<u32>;

    /// Give up on a record until an operator requeues it
    fn mark_error(&self, id: &RecordId, error_message: &str) -> Result<()>;

    /// Local mutation of the payload: bumps `local_version` by one.
    /// An `ERROR` record goes back to `PENDING` with a fresh attempt budget.
    fn update_payload(&self, id: &RecordId, payload: &ScorePayload) -> Result<GameScoreRecord>;

    /// Write the outcome of a conflict resolution
    fn apply_resolution(&self, id: &RecordId, resolved: &ResolvedRecord) -> Result<()>;

    /// Move every `ERROR` record back to `PENDING`, returning how many moved
    fn requeue_failed(&self) -> Result<usize>;
}

const RECORD_COLUMNS: &str = "id, owner_id, game_id, payload, played_at, device_id,
    local_version, server_version, remote_version, modified_at, content_hash,
    sync_status, sync_attempts, last_sync_error";

/// `SQLite` implementation of `RecordStore`
#[derive(Debug, Clone)]
pub struct SqliteRecordRepository {
    db: Database,
}

impl SqliteRecordRepository {
    /// Create a new repository over the given database
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Parse a record from a database row
    fn parse_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<GameScoreRecord> {
        let id: String = row.get(0)?;
        let payload: String = row.get(3)?;
        let status: String = row.get(11)?;
        Ok(GameScoreRecord {
            id: id.parse().map_err(|e| conversion_error(0, e))?,
            owner_id: row.get(1)?,
            game_id: row.get(2)?,
            payload: serde_json::from_str(&payload).map_err(|e| conversion_error(3, e))?,
            played_at: row.get(4)?,
            device_id: row.get(5)?,
            local_version: row.get(6)?,
            server_version: row.get(7)?,
            remote_version: row.get(8)?,
            modified_at: row.get(9)?,
            content_hash: row.get(10)?,
            sync_status: status.parse().map_err(|e| conversion_error(11, e))?,
            sync_attempts: row.get(12)?,
            last_sync_error: row.get(13)?,
        })
    }

    fn query_records(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<GameScoreRecord>> {
        let mut stmt = conn.prepare(sql)?;
        let records = stmt
            .query_map(params, Self::parse_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn get_with(conn: &Connection, id: &RecordId) -> Result<Option<GameScoreRecord>> {
        Ok(conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM score_records WHERE id = ?"),
                params![id.as_str()],
                Self::parse_record,
            )
            .optional()?)
    }
}

fn conversion_error(
    column: usize,
    error: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        Box::new(error),
    )
}

fn ensure_updated(rows: usize, id: &RecordId) -> Result<()> {
    if rows == 0 {
        Err(Error::NotFound(format!("score record {id}")))
    } else {
        Ok(())
    }
}

impl RecordStore for SqliteRecordRepository {
    fn enqueue(&self, record: &GameScoreRecord) -> Result<()> {
        let payload = serde_json::to_string(&record.payload)?;
        self.db.with_connection(|conn| {
            let rows = conn.execute(
                "INSERT OR IGNORE INTO score_records (
                    id, owner_id, game_id, payload, played_at, device_id,
                    local_version, server_version, remote_version, modified_at, content_hash,
                    sync_status, sync_attempts, last_sync_error
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.id.as_str(),
                    record.owner_id,
                    record.game_id,
                    payload,
                    record.played_at,
                    record.device_id,
                    record.local_version,
                    record.server_version,
                    record.remote_version,
                    record.modified_at,
                    record.content_hash,
                    record.sync_status.as_str(),
                    record.sync_attempts,
                    record.last_sync_error,
                ],
            )?;
            if rows == 0 {
                return Err(Error::InvalidInput(format!(
                    "score record {} is already queued",
                    record.id
                )));
            }
            tracing::debug!("Queued score record {}", record.id);
            Ok(())
        })
    }

    fn get(&self, id: &RecordId) -> Result<Option<GameScoreRecord>> {
        self.db.with_connection(|conn| Self::get_with(conn, id))
    }

    fn find_pending(&self, limit: usize) -> Result<Vec<GameScoreRecord>> {
        self.db.with_connection(|conn| {
            Self::query_records(
                conn,
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM score_records
                     WHERE sync_status = 'PENDING'
                     ORDER BY played_at ASC, id ASC
                     LIMIT ?"
                ),
                params![limit_param(limit)],
            )
        })
    }

    fn find_pending_since(&self, timestamp: i64, limit: usize) -> Result<Vec<GameScoreRecord>> {
        self.db.with_connection(|conn| {
            Self::query_records(
                conn,
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM score_records
                     WHERE sync_status = 'PENDING'
                       AND (modified_at >= ? OR sync_attempts > 0)
                     ORDER BY modified_at ASC, id ASC
                     LIMIT ?"
                ),
                params![timestamp, limit_param(limit)],
            )
        })
    }

    fn find_by_status(&self, status: SyncStatus) -> Result<Vec<GameScoreRecord>> {
        self.db.with_connection(|conn| {
            Self::query_records(
                conn,
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM score_records
                     WHERE sync_status = ?
                     ORDER BY played_at ASC, id ASC"
                ),
                params![status.as_str()],
            )
        })
    }

    fn find_modified_after(&self, timestamp: i64) -> Result<Vec<GameScoreRecord>> {
        self.db.with_connection(|conn| {
            Self::query_records(
                conn,
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM score_records
                     WHERE modified_at > ?
                     ORDER BY modified_at ASC, id ASC"
                ),
                params![timestamp],
            )
        })
    }

    fn count_by_status(&self, status: SyncStatus) -> Result<usize> {
        self.db.with_connection(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM score_records WHERE sync_status = ?",
                params![status.as_str()],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
    }

    fn mark_synced(&self, id: &RecordId, server_version: i64) -> Result<()> {
        // SET expressions read the pre-update row, so a record edited after
        // the uploaded version stays PENDING.
        self.db.with_connection(|conn| {
            let rows = conn.execute(
                "UPDATE score_records SET
                    server_version = MAX(server_version, ?1),
                    local_version = MAX(local_version, ?1),
                    remote_version = NULL,
                    sync_status = CASE WHEN local_version <= ?1 THEN 'SYNCED' ELSE 'PENDING' END,
                    sync_attempts = 0,
                    last_sync_error = NULL
                 WHERE id = ?2",
                params![server_version, id.as_str()],
            )?;
            ensure_updated(rows, id)
        })
    }

    fn mark_conflict(&self, id: &RecordId, server_version: i64) -> Result<()> {
        self.db.with_connection(|conn| {
            let rows = conn.execute(
                "UPDATE score_records SET sync_status = 'CONFLICT', remote_version = ?
                 WHERE id = ?",
                params![server_version, id.as_str()],
            )?;
            ensure_updated(rows, id)
        })
    }

    fn increment_attempt(&self, id: &RecordId, error_message: &str) -> Result<u32> {
        self.db.with_connection(|conn| {
            let attempts = conn
                .query_row(
                    "UPDATE score_records SET
                        sync_attempts = sync_attempts + 1,
                        last_sync_error = ?
                     WHERE id = ?
                     RETURNING sync_attempts",
                    params![error_message, id.as_str()],
                    |row| row.get::<_, u32>(0),
                )
                .optional()?;
            attempts.ok_or_else(|| Error::NotFound(format!("score record {id}")))
        })
    }

    fn mark_error(&self, id: &RecordId, error_message: &str) -> Result<()> {
        self.db.with_connection(|conn| {
            let rows = conn.execute(
                "UPDATE score_records SET sync_status = 'ERROR', last_sync_error = ?
                 WHERE id = ?",
                params![error_message, id.as_str()],
            )?;
            ensure_updated(rows, id)
        })
    }

    fn update_payload(&self, id: &RecordId, payload: &ScorePayload) -> Result<GameScoreRecord> {
        let encoded = serde_json::to_string(payload)?;
        let hash = payload.content_hash();
        let now = chrono::Utc::now().timestamp_millis();

        self.db.with_connection(|conn| {
            let tx = conn.transaction()?;
            let rows = tx.execute(
                "UPDATE score_records SET
                    payload = ?,
                    content_hash = ?,
                    local_version = local_version + 1,
                    modified_at = ?,
                    sync_attempts = CASE WHEN sync_status = 'ERROR' THEN 0 ELSE sync_attempts END,
                    last_sync_error = CASE WHEN sync_status = 'ERROR' THEN NULL ELSE last_sync_error END,
                    sync_status = CASE WHEN sync_status = 'CONFLICT' THEN 'CONFLICT' ELSE 'PENDING' END
                 WHERE id = ?",
                params![encoded, hash, now, id.as_str()],
            )?;
            ensure_updated(rows, id)?;
            let record = Self::get_with(&tx, id)?
                .ok_or_else(|| Error::NotFound(format!("score record {id}")))?;
            tx.commit()?;
            Ok(record)
        })
    }

    fn apply_resolution(&self, id: &RecordId, resolved: &ResolvedRecord) -> Result<()> {
        let encoded = serde_json::to_string(&resolved.payload)?;
        let hash = resolved.payload.content_hash();
        let now = chrono::Utc::now().timestamp_millis();

        self.db.with_connection(|conn| {
            let rows = conn.execute(
                "UPDATE score_records SET
                    payload = ?,
                    content_hash = ?,
                    local_version = ?,
                    server_version = MAX(server_version, ?),
                    remote_version = NULL,
                    sync_status = ?,
                    modified_at = ?,
                    sync_attempts = 0,
                    last_sync_error = NULL
                 WHERE id = ?",
                params![
                    encoded,
                    hash,
                    resolved.local_version,
                    resolved.server_version,
                    resolved.status.as_str(),
                    now,
                    id.as_str(),
                ],
            )?;
            ensure_updated(rows, id)
        })
    }

    fn requeue_failed(&self) -> Result<usize> {
        let now = chrono::Utc::now().timestamp_millis();
        self.db.with_connection(|conn| {
            Ok(conn.execute(
                "UPDATE score_records SET
                    sync_status = 'PENDING',
                    sync_attempts = 0,
                    last_sync_error = NULL,
                    modified_at = ?
                 WHERE sync_status = 'ERROR'",
                params![now],
            )?)
        })
    }
}
