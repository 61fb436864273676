use std::path::Path;
use std::sync::Arc;

use scoresync_core::sync::{ScheduleConfig, SyncScheduler};

use crate::commands::common::{build_engine, load_settings, open_database};
use crate::error::CliError;

pub async fn run_daemon(db_path: &Path, config_path: &Path) -> Result<(), CliError> {
    let settings = load_settings(config_path)?;
    let db = open_database(db_path)?;
    let engine = Arc::new(build_engine(&db, &settings)?);

    let pruned = engine.prune(settings.conflict_retention_days)?;
    if pruned.conflicts > 0 || pruned.logs > 0 {
        tracing::info!(
            "Pruned {} resolved conflicts and {} sync logs",
            pruned.conflicts,
            pruned.logs
        );
    }

    let handle = SyncScheduler::spawn(engine, ScheduleConfig::from_settings(&settings));
    println!(
        "Syncing every {} minutes; press Ctrl-C to stop",
        settings.sync_interval_minutes
    );

    tokio::signal::ctrl_c().await?;
    println!("Shutting down...");
    handle.shutdown().await;
    Ok(())
}
