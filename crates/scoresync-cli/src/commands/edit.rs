use std::path::Path;

use scoresync_core::db::{RecordStore, SqliteRecordRepository};
use scoresync_core::ScorePayload;

use crate::cli::EditArgs;
use crate::commands::common::{open_database, parse_metadata, parse_record_id};
use crate::error::CliError;

pub fn run_edit(args: &EditArgs, db_path: &Path) -> Result<(), CliError> {
    let id = parse_record_id(&args.id)?;
    let db = open_database(db_path)?;
    let repo = SqliteRecordRepository::new(db);

    let record = repo
        .get(&id)?
        .ok_or_else(|| CliError::RecordNotFound(id.to_string()))?;
    let payload = apply_edits(record.payload.clone(), args)?;
    if payload == record.payload {
        return Err(CliError::NothingToEdit);
    }

    let updated = repo.update_payload(&id, &payload)?;
    println!(
        "{}  v{}  {}",
        updated.id, updated.local_version, updated.sync_status
    );
    Ok(())
}

/// Overlay the fields given on the command line onto `payload`.
///
/// A metadata entry with an empty value removes that key.
pub fn apply_edits(mut payload: ScorePayload, args: &EditArgs) -> Result<ScorePayload, CliError> {
    if let Some(score) = args.score {
        payload.score = score;
    }
    if let Some(max_score) = args.max_score {
        payload.max_score = max_score;
    }
    if let Some(correct) = args.correct {
        payload.correct_answers = correct;
    }
    if let Some(total) = args.total {
        payload.total_questions = total;
    }
    if let Some(duration_ms) = args.duration_ms {
        payload.duration_ms = duration_ms;
    }
    if args.level.is_some() {
        payload.level = args.level;
    }
    for (key, value) in parse_metadata(&args.metadata)? {
        if value.is_empty() {
            payload.metadata.remove(&key);
        } else {
            payload.metadata.insert(key, value);
        }
    }
    Ok(payload)
}
