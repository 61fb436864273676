use std::path::Path;

use scoresync_core::db::{RecordStore, SqliteRecordRepository};
use scoresync_core::util::normalize_text_option;
use scoresync_core::{GameScoreRecord, ScorePayload};

use crate::cli::RecordArgs;
use crate::commands::common::{device_id_from, env_lookup, open_database, parse_metadata};
use crate::error::CliError;

pub fn run_record(args: RecordArgs, db_path: &Path) -> Result<(), CliError> {
    let record = build_record(args, &device_id_from(env_lookup))?;

    let db = open_database(db_path)?;
    SqliteRecordRepository::new(db).enqueue(&record)?;

    println!("{}", record.id);
    Ok(())
}

pub fn build_record(args: RecordArgs, device_id: &str) -> Result<GameScoreRecord, CliError> {
    let owner_id = required(args.owner, "owner")?;
    let game_id = required(args.game, "game")?;
    let payload = ScorePayload {
        score: args.score,
        max_score: args.max_score,
        correct_answers: args.correct,
        total_questions: args.total,
        duration_ms: args.duration_ms,
        level: args.level,
        metadata: parse_metadata(&args.metadata)?,
    };

    let record = GameScoreRecord::new(owner_id, game_id, device_id, payload);
    Ok(match args.played_at {
        Some(played_at) => record.played_at(played_at),
        None => record,
    })
}

fn required(value: String, name: &str) -> Result<String, CliError> {
    normalize_text_option(Some(value)).ok_or_else(|| {
        CliError::Core(scoresync_core::Error::InvalidInput(format!(
            "--{name} cannot be empty"
        )))
    })
}
