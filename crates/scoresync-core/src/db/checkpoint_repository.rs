//! Checkpoint repository implementation

use crate::error::Result;
use crate::models::SyncCheckpoint;
use rusqlite::{params, Connection, OptionalExtension};

use super::Database;

/// Storage port for per entity type sync cursors
pub trait CheckpointStore: Send + Sync {
    /// Existing checkpoint, or a freshly persisted zero-state one
    fn get_or_create(&self, entity_type: &str) -> Result<SyncCheckpoint>;

    /// Existing checkpoint without creating one
    fn get(&self, entity_type: &str) -> Result<Option<SyncCheckpoint>>;

    /// Move the cursor forward after a fully committed round.
    ///
    /// Only applies while the stored version still equals `expected_version`;
    /// returns `None` when a reset or another round moved it first.
    fn advance(
        &self,
        entity_type: &str,
        expected_version: i64,
        timestamp: i64,
        server_sequence_id: Option<&str>,
    ) -> Result<Option<SyncCheckpoint>>;

    /// Clear back to the initial state, forcing the next round to be FULL
    fn reset(&self, entity_type: &str) -> Result<SyncCheckpoint>;
}

/// `SQLite` implementation of `CheckpointStore`
#[derive(Debug, Clone)]
pub struct SqliteCheckpointRepository {
    db: Database,
}

impl SqliteCheckpointRepository {
    /// Create a new repository over the given database
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    fn parse_checkpoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncCheckpoint> {
        Ok(SyncCheckpoint {
            entity_type: row.get(0)?,
            last_sync_timestamp: row.get(1)?,
            last_sync_version: row.get(2)?,
            server_sequence_id: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn get_with(conn: &Connection, entity_type: &str) -> Result<Option<SyncCheckpoint>> {
        Ok(conn
            .query_row(
                "SELECT entity_type, last_sync_timestamp, last_sync_version, server_sequence_id, updated_at
                 FROM sync_checkpoints WHERE entity_type = ?",
                params![entity_type],
                Self::parse_checkpoint,
            )
            .optional()?)
    }

    fn upsert(conn: &Connection, checkpoint: &SyncCheckpoint) -> Result<()> {
        conn.execute(
            "INSERT INTO sync_checkpoints (
                entity_type, last_sync_timestamp, last_sync_version, server_sequence_id, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(entity_type) DO UPDATE SET
                last_sync_timestamp = excluded.last_sync_timestamp,
                last_sync_version = excluded.last_sync_version,
                server_sequence_id = excluded.server_sequence_id,
                updated_at = excluded.updated_at",
            params![
                checkpoint.entity_type,
                checkpoint.last_sync_timestamp,
                checkpoint.last_sync_version,
                checkpoint.server_sequence_id,
                checkpoint.updated_at,
            ],
        )?;
        Ok(())
    }
}

impl CheckpointStore for SqliteCheckpointRepository {
    fn get_or_create(&self, entity_type: &str) -> Result<SyncCheckpoint> {
        self.db.with_connection(|conn| {
            if let Some(existing) = Self::get_with(conn, entity_type)? {
                return Ok(existing);
            }

            let checkpoint = SyncCheckpoint::initial(entity_type);
            Self::upsert(conn, &checkpoint)?;
            tracing::debug!("Created initial checkpoint for {entity_type}");
            Ok(checkpoint)
        })
    }

    fn get(&self, entity_type: &str) -> Result<Option<SyncCheckpoint>> {
        self.db
            .with_connection(|conn| Self::get_with(conn, entity_type))
    }

    fn advance(
        &self,
        entity_type: &str,
        expected_version: i64,
        timestamp: i64,
        server_sequence_id: Option<&str>,
    ) -> Result<Option<SyncCheckpoint>> {
        let checkpoint = SyncCheckpoint {
            entity_type: entity_type.to_string(),
            last_sync_timestamp: Some(timestamp),
            last_sync_version: expected_version + 1,
            server_sequence_id: server_sequence_id.map(str::to_string),
            updated_at: chrono::Utc::now().timestamp_millis(),
        };
        let rows = self.db.with_connection(|conn| {
            Ok(conn.execute(
                "UPDATE sync_checkpoints SET
                    last_sync_timestamp = ?1,
                    last_sync_version = ?2,
                    server_sequence_id = ?3,
                    updated_at = ?4
                 WHERE entity_type = ?5 AND last_sync_version = ?6",
                params![
                    checkpoint.last_sync_timestamp,
                    checkpoint.last_sync_version,
                    checkpoint.server_sequence_id,
                    checkpoint.updated_at,
                    entity_type,
                    expected_version,
                ],
            )?)
        })?;
        if rows == 0 {
            return Ok(None);
        }

        tracing::debug!(
            "Advanced {entity_type} checkpoint to version {} at {timestamp}",
            checkpoint.last_sync_version
        );
        Ok(Some(checkpoint))
    }

    fn reset(&self, entity_type: &str) -> Result<SyncCheckpoint> {
        let checkpoint = SyncCheckpoint::initial(entity_type);
        self.db.with_connection(|conn| Self::upsert(conn, &checkpoint))?;
        tracing::info!("Reset {entity_type} checkpoint; next round will be a full sync");
        Ok(checkpoint)
    }
}
