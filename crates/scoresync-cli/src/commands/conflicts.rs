use std::path::Path;

use scoresync_core::db::{
    ConflictStore, SqliteConflictRepository, SqliteSyncLogRepository, SyncLogStore,
};
use scoresync_core::models::{Resolution, SyncConflict};

use crate::cli::ResolutionChoice;
use crate::commands::common::{build_engine, format_conflict_lines, load_settings, open_database};
use crate::error::CliError;

pub fn run_conflicts_list(
    include_resolved: bool,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let conflicts = list_conflicts(&SqliteConflictRepository::new(db), include_resolved, limit)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&conflicts)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub fn list_conflicts(
    store: &impl ConflictStore,
    include_resolved: bool,
    limit: usize,
) -> Result<Vec<SyncConflict>, CliError> {
    let mut conflicts = if include_resolved {
        store.list_recent(limit)?
    } else {
        store.list_unresolved()?
    };
    conflicts.truncate(limit);
    Ok(conflicts)
}

pub fn run_conflicts_resolve(
    id: i64,
    resolution: ResolutionChoice,
    db_path: &Path,
    config_path: &Path,
) -> Result<(), CliError> {
    let settings = load_settings(config_path)?;
    let db = open_database(db_path)?;
    let engine = build_engine(&db, &settings)?;

    let resolution: Resolution = resolution.into();
    if !engine.resolve_conflict(id, resolution)? {
        return Err(CliError::AlreadyResolved(id));
    }
    println!("Conflict {id} resolved as {resolution}");
    Ok(())
}

pub fn run_conflicts_prune(
    days: Option<u32>,
    db_path: &Path,
    config_path: &Path,
) -> Result<(), CliError> {
    let days = match days {
        Some(days) => days,
        None => load_settings(config_path)?.conflict_retention_days,
    };
    let db = open_database(db_path)?;
    let conflicts = SqliteConflictRepository::new(db.clone()).prune_resolved(days)?;
    let logs = SqliteSyncLogRepository::new(db).prune(days)?;

    println!("Removed {conflicts} resolved conflicts and {logs} sync logs older than {days} days");
    Ok(())
}
