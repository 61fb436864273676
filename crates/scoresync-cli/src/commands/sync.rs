use std::path::Path;

use scoresync_core::models::{RoundSummary, SyncType};
use scoresync_core::sync::{RoundOutcome, RoundReport};
use serde::Serialize;

use crate::commands::common::{build_engine, load_settings, open_database};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct SyncReportItem {
    pub outcome: &'static str,
    pub log_id: Option<i64>,
    pub sync_type: Option<SyncType>,
    pub summary: Option<RoundSummary>,
    pub message: String,
}

pub async fn run_sync(as_json: bool, db_path: &Path, config_path: &Path) -> Result<(), CliError> {
    let settings = load_settings(config_path)?;
    let db = open_database(db_path)?;
    let engine = build_engine(&db, &settings)?;

    let outcome = engine.sync_now().await;
    let item = sync_report_item(&outcome);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        println!("{}", item.message);
    }

    match outcome {
        RoundOutcome::Failed { error, .. } => Err(CliError::SyncFailed(error.to_string())),
        _ => Ok(()),
    }
}

pub fn sync_report_item(outcome: &RoundOutcome) -> SyncReportItem {
    let from_report = |label: &'static str, report: &RoundReport| SyncReportItem {
        outcome: label,
        log_id: report.log_id,
        sync_type: Some(report.sync_type),
        summary: Some(report.summary.clone()),
        message: report.message.clone(),
    };

    match outcome {
        RoundOutcome::Completed(report) => from_report("completed", report),
        RoundOutcome::Failed { report, .. } => from_report("failed", report),
        RoundOutcome::Skipped => SyncReportItem {
            outcome: "skipped",
            log_id: None,
            sync_type: None,
            summary: None,
            message: "A sync round is already running".to_string(),
        },
        RoundOutcome::Offline { pending } => SyncReportItem {
            outcome: "offline",
            log_id: None,
            sync_type: None,
            summary: None,
            message: format!("Offline; {pending} scores waiting to sync"),
        },
    }
}
