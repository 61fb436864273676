use std::path::Path;

use scoresync_core::db::{CheckpointStore, SqliteCheckpointRepository};
use scoresync_core::models::{SyncCheckpoint, GAME_SCORE_ENTITY};

use crate::commands::common::{format_sync_timestamp, open_database};
use crate::error::CliError;

pub fn run_checkpoint_show(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let checkpoint = SqliteCheckpointRepository::new(db)
        .get(GAME_SCORE_ENTITY)?
        .unwrap_or_else(|| SyncCheckpoint::initial(GAME_SCORE_ENTITY));

    if as_json {
        println!("{}", serde_json::to_string_pretty(&checkpoint)?);
    } else {
        println!("{}", format_checkpoint(&checkpoint));
    }
    Ok(())
}

pub fn run_checkpoint_reset(db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    SqliteCheckpointRepository::new(db).reset(GAME_SCORE_ENTITY)?;
    println!("Checkpoint reset; the next round will be a full sync");
    Ok(())
}

pub fn format_checkpoint(checkpoint: &SyncCheckpoint) -> String {
    if checkpoint.is_initial() {
        return format!("{}: no completed round yet", checkpoint.entity_type);
    }
    let timestamp = checkpoint
        .last_sync_timestamp
        .map_or_else(|| "-".to_string(), format_sync_timestamp);
    let sequence = checkpoint.server_sequence_id.as_deref().unwrap_or("-");
    format!(
        "{}: v{}  up to {timestamp}  sequence={sequence}",
        checkpoint.entity_type, checkpoint.last_sync_version
    )
}
