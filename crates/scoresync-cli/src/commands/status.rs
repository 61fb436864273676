use std::path::Path;

use scoresync_core::db::{
    CheckpointStore, ConflictStore, RecordStore, SqliteCheckpointRepository,
    SqliteConflictRepository, SqliteRecordRepository, SqliteSyncLogRepository, SyncLogStore,
};
use scoresync_core::models::{SyncLog, GAME_SCORE_ENTITY};
use scoresync_core::SyncStatus;
use serde::Serialize;

use crate::commands::common::{format_log_lines, format_sync_timestamp, open_database};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub pending: usize,
    pub synced: usize,
    pub conflict: usize,
    pub error: usize,
    pub unresolved_conflicts: usize,
    pub checkpoint_timestamp: Option<i64>,
    pub checkpoint_version: i64,
    pub last_round: Option<SyncLog>,
}

pub fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let records = SqliteRecordRepository::new(db.clone());
    let checkpoint = SqliteCheckpointRepository::new(db.clone()).get(GAME_SCORE_ENTITY)?;

    let report = StatusReport {
        pending: records.count_by_status(SyncStatus::Pending)?,
        synced: records.count_by_status(SyncStatus::Synced)?,
        conflict: records.count_by_status(SyncStatus::Conflict)?,
        error: records.count_by_status(SyncStatus::Error)?,
        unresolved_conflicts: SqliteConflictRepository::new(db.clone()).count_unresolved()?,
        checkpoint_timestamp: checkpoint
            .as_ref()
            .and_then(|checkpoint| checkpoint.last_sync_timestamp),
        checkpoint_version: checkpoint.map_or(0, |checkpoint| checkpoint.last_sync_version),
        last_round: SqliteSyncLogRepository::new(db).last()?,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_status_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_status_lines(report: &StatusReport) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Scores: {} pending, {} synced, {} in conflict, {} failed",
            report.pending, report.synced, report.conflict, report.error
        ),
        format!("Unresolved conflicts: {}", report.unresolved_conflicts),
    ];
    lines.push(report.checkpoint_timestamp.map_or_else(
        || "Checkpoint: none (next round is a full sync)".to_string(),
        |timestamp| {
            format!(
                "Checkpoint: v{} at {}",
                report.checkpoint_version,
                format_sync_timestamp(timestamp)
            )
        },
    ));
    match &report.last_round {
        Some(log) => lines.extend(
            format_log_lines(std::slice::from_ref(log))
                .into_iter()
                .map(|line| format!("Last round: {line}")),
        ),
        None => lines.push("Last round: never".to_string()),
    }
    lines
}
