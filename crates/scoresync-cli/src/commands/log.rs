use std::path::Path;

use scoresync_core::db::{SqliteSyncLogRepository, SyncLogStore};

use crate::commands::common::{format_log_lines, open_database};
use crate::error::CliError;

pub fn run_log(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let logs = SqliteSyncLogRepository::new(db).recent(limit)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&logs)?);
    } else if logs.is_empty() {
        println!("No sync rounds recorded.");
    } else {
        for line in format_log_lines(&logs) {
            println!("{line}");
        }
    }
    Ok(())
}
