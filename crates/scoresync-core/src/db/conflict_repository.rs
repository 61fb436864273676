//! Conflict repository implementation

#![allow(clippy::cast_possible_wrap)]

use crate::error::{Error, Result};
use crate::models::{NewSyncConflict, Resolution, ResolvedBy, SyncConflict};
use crate::util::unix_millis_days_ago;
use rusqlite::{params, Connection, OptionalExtension};

use super::{limit_param, Database};

/// Storage port for detected conflicts
pub trait ConflictStore: Send + Sync {
    /// Persist a detected conflict as unresolved
    fn insert(&self, conflict: &NewSyncConflict) -> Result<SyncConflict>;

    /// Get a conflict by row ID
    fn get(&self, id: i64) -> Result<Option<SyncConflict>>;

    /// Unresolved conflicts, oldest first
    fn list_unresolved(&self) -> Result<Vec<SyncConflict>>;

    /// Most recent conflicts of any resolution, newest first
    fn list_recent(&self, limit: usize) -> Result<Vec<SyncConflict>>;

    /// Every conflict recorded for one entity, oldest first
    fn list_for_entity(&self, entity_type: &str, entity_id: &str) -> Result<Vec<SyncConflict>>;

    /// Record a resolution. Returns `false` when the conflict was already
    /// resolved, in which case nothing changes.
    fn resolve(&self, id: i64, resolution: Resolution, resolved_by: ResolvedBy) -> Result<bool>;

    /// Number of unresolved conflicts
    fn count_unresolved(&self) -> Result<usize>;

    /// Delete resolved conflicts created more than `older_than_days` ago
    fn prune_resolved(&self, older_than_days: u32) -> Result<usize>;
}

const CONFLICT_COLUMNS: &str = "id, entity_type, entity_id, field_name, local_value, server_value,
    local_version, server_version, local_timestamp, server_timestamp, conflict_type,
    resolution, resolved_at, resolved_by, created_at";

/// `SQLite` implementation of `ConflictStore`
#[derive(Debug, Clone)]
pub struct SqliteConflictRepository {
    db: Database,
}

impl SqliteConflictRepository {
    /// Create a new repository over the given database
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    fn parse_conflict(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncConflict> {
        let conflict_type: String = row.get(10)?;
        let resolution: String = row.get(11)?;
        let resolved_by: Option<String> = row.get(13)?;
        Ok(SyncConflict {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            field_name: row.get(3)?,
            local_value: row.get(4)?,
            server_value: row.get(5)?,
            local_version: row.get(6)?,
            server_version: row.get(7)?,
            local_timestamp: row.get(8)?,
            server_timestamp: row.get(9)?,
            conflict_type: conflict_type
                .parse()
                .map_err(|e| conversion_error(10, e))?,
            resolution: resolution.parse().map_err(|e| conversion_error(11, e))?,
            resolved_at: row.get(12)?,
            resolved_by: resolved_by
                .map(|value| value.parse())
                .transpose()
                .map_err(|e| conversion_error(13, e))?,
            created_at: row.get(14)?,
        })
    }

    fn get_with(conn: &Connection, id: i64) -> Result<Option<SyncConflict>> {
        Ok(conn
            .query_row(
                &format!("SELECT {CONFLICT_COLUMNS} FROM sync_conflicts WHERE id = ?"),
                params![id],
                Self::parse_conflict,
            )
            .optional()?)
    }

    fn query_conflicts(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<SyncConflict>> {
        let mut stmt = conn.prepare(sql)?;
        let conflicts = stmt
            .query_map(params, Self::parse_conflict)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(conflicts)
    }
}

fn conversion_error(column: usize, error: Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        Box::new(error),
    )
}

impl ConflictStore for SqliteConflictRepository {
    fn insert(&self, conflict: &NewSyncConflict) -> Result<SyncConflict> {
        let now = chrono::Utc::now().timestamp_millis();
        self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO sync_conflicts (
                    entity_type, entity_id, field_name, local_value, server_value,
                    local_version, server_version, local_timestamp, server_timestamp,
                    conflict_type, resolution, created_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'PENDING', ?)",
                params![
                    conflict.entity_type,
                    conflict.entity_id,
                    conflict.field_name,
                    conflict.local_value,
                    conflict.server_value,
                    conflict.local_version,
                    conflict.server_version,
                    conflict.local_timestamp,
                    conflict.server_timestamp,
                    conflict.conflict_type.as_str(),
                    now,
                ],
            )?;
            let id = conn.last_insert_rowid();
            Self::get_with(conn, id)?
                .ok_or_else(|| Error::Database(format!("conflict {id} vanished after insert")))
        })
    }

    fn get(&self, id: i64) -> Result<Option<SyncConflict>> {
        self.db.with_connection(|conn| Self::get_with(conn, id))
    }

    fn list_unresolved(&self) -> Result<Vec<SyncConflict>> {
        self.db.with_connection(|conn| {
            Self::query_conflicts(
                conn,
                &format!(
                    "SELECT {CONFLICT_COLUMNS} FROM sync_conflicts
                     WHERE resolution = 'PENDING'
                     ORDER BY created_at ASC, id ASC"
                ),
                [],
            )
        })
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        self.db.with_connection(|conn| {
            Self::query_conflicts(
                conn,
                &format!(
                    "SELECT {CONFLICT_COLUMNS} FROM sync_conflicts
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?"
                ),
                params![limit_param(limit)],
            )
        })
    }

    fn list_for_entity(&self, entity_type: &str, entity_id: &str) -> Result<Vec<SyncConflict>> {
        self.db.with_connection(|conn| {
            Self::query_conflicts(
                conn,
                &format!(
                    "SELECT {CONFLICT_COLUMNS} FROM sync_conflicts
                     WHERE entity_type = ? AND entity_id = ?
                     ORDER BY created_at ASC, id ASC"
                ),
                params![entity_type, entity_id],
            )
        })
    }

    fn resolve(&self, id: i64, resolution: Resolution, resolved_by: ResolvedBy) -> Result<bool> {
        if resolution == Resolution::Pending {
            return Err(Error::InvalidInput(
                "a conflict cannot be resolved as PENDING".to_string(),
            ));
        }

        let now = chrono::Utc::now().timestamp_millis();
        self.db.with_connection(|conn| {
            let rows = conn.execute(
                "UPDATE sync_conflicts SET resolution = ?, resolved_by = ?, resolved_at = ?
                 WHERE id = ? AND resolution = 'PENDING'",
                params![resolution.as_str(), resolved_by.as_str(), now, id],
            )?;
            if rows > 0 {
                return Ok(true);
            }

            match Self::get_with(conn, id)? {
                Some(_) => Ok(false),
                None => Err(Error::NotFound(format!("sync conflict {id}"))),
            }
        })
    }

    fn count_unresolved(&self) -> Result<usize> {
        self.db.with_connection(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sync_conflicts WHERE resolution = 'PENDING'",
                [],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
    }

    fn prune_resolved(&self, older_than_days: u32) -> Result<usize> {
        let cutoff = unix_millis_days_ago(older_than_days);
        let removed = self.db.with_connection(|conn| {
            Ok(conn.execute(
                "DELETE FROM sync_conflicts WHERE resolution != 'PENDING' AND created_at < ?",
                params![cutoff],
            )?)
        })?;
        if removed > 0 {
            tracing::info!("Pruned {removed} resolved sync conflicts older than {older_than_days} days");
        }
        Ok(removed)
    }
}
