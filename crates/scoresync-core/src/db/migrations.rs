//! Database migrations

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension};

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .optional()?;

    Ok(version.unwrap_or(0))
}

/// Migration to version 1: score queue and checkpoints
fn migrate_v1(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS score_records (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            game_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            played_at INTEGER NOT NULL,
            device_id TEXT NOT NULL,
            local_version INTEGER NOT NULL DEFAULT 1,
            server_version INTEGER NOT NULL DEFAULT 0,
            remote_version INTEGER,
            modified_at INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            sync_status TEXT NOT NULL DEFAULT 'PENDING',
            sync_attempts INTEGER NOT NULL DEFAULT 0,
            last_sync_error TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_score_records_status_played
            ON score_records(sync_status, played_at);
        CREATE INDEX IF NOT EXISTS idx_score_records_modified
            ON score_records(modified_at);

        CREATE TABLE IF NOT EXISTS sync_checkpoints (
            entity_type TEXT PRIMARY KEY,
            last_sync_timestamp INTEGER,
            last_sync_version INTEGER NOT NULL DEFAULT 0,
            server_sequence_id TEXT,
            updated_at INTEGER NOT NULL
        );

        INSERT INTO schema_version (version) VALUES (1);",
    )?;

    tx.commit()?;
    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: conflict tracking and sync history
fn migrate_v2(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS sync_conflicts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            field_name TEXT,
            local_value TEXT,
            server_value TEXT,
            local_version INTEGER NOT NULL,
            server_version INTEGER NOT NULL,
            local_timestamp INTEGER NOT NULL,
            server_timestamp INTEGER,
            conflict_type TEXT NOT NULL,
            resolution TEXT NOT NULL DEFAULT 'PENDING',
            resolved_at INTEGER,
            resolved_by TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sync_conflicts_entity
            ON sync_conflicts(entity_type, entity_id);
        CREATE INDEX IF NOT EXISTS idx_sync_conflicts_resolution
            ON sync_conflicts(resolution);

        CREATE TABLE IF NOT EXISTS sync_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sync_started_at INTEGER NOT NULL,
            sync_completed_at INTEGER,
            sync_type TEXT NOT NULL,
            scores_uploaded INTEGER NOT NULL DEFAULT 0,
            scores_failed INTEGER NOT NULL DEFAULT 0,
            bytes_transferred INTEGER NOT NULL DEFAULT 0,
            success INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            conflicts_detected INTEGER NOT NULL DEFAULT 0,
            conflicts_resolved INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_sync_logs_started
            ON sync_logs(sync_started_at DESC);

        INSERT INTO schema_version (version) VALUES (2);",
    )?;

    tx.commit()?;
    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
