use std::path::Path;

use scoresync_core::db::{RecordStore, SqliteRecordRepository};
use scoresync_core::{GameScoreRecord, SyncStatus};

use crate::cli::StatusFilter;
use crate::commands::common::{
    format_record_lines, now_ms, open_database, record_to_list_item, RecordListItem,
};
use crate::error::CliError;

pub fn run_list(
    status: Option<StatusFilter>,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let records = list_records(&SqliteRecordRepository::new(db), status, limit)?;
    let now = now_ms();

    if as_json {
        let json_items = records
            .iter()
            .map(|record| record_to_list_item(record, now))
            .collect::<Vec<RecordListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if records.is_empty() {
        println!("No scores queued.");
    } else {
        for line in format_record_lines(&records, now) {
            println!("{line}");
        }
    }

    Ok(())
}

/// Most recently played records first
pub fn list_records(
    repo: &impl RecordStore,
    status: Option<StatusFilter>,
    limit: usize,
) -> Result<Vec<GameScoreRecord>, CliError> {
    let statuses = status.map_or_else(|| SyncStatus::ALL.to_vec(), |filter| vec![filter.into()]);

    let mut records = Vec::new();
    for status in statuses {
        records.extend(repo.find_by_status(status)?);
    }
    records.sort_by(|a, b| b.played_at.cmp(&a.played_at).then_with(|| b.id.cmp(&a.id)));
    records.truncate(limit);
    Ok(records)
}
