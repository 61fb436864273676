use std::path::Path;

use scoresync_core::db::{RecordStore, SqliteRecordRepository};

use crate::commands::common::open_database;
use crate::error::CliError;

pub fn run_retry(db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let requeued = SqliteRecordRepository::new(db).requeue_failed()?;
    if requeued == 0 {
        println!("No failed scores to retry.");
    } else {
        println!("Requeued {requeued} failed scores");
    }
    Ok(())
}
