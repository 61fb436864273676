//! scoresync CLI - operator surface for the score sync engine
//!
//! Queue scores, inspect the queue and conflicts, and run sync rounds by
//! hand or as a scheduled daemon.

mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{CheckpointCommand, Cli, Commands, ConflictsCommand};
use crate::commands::checkpoint::{run_checkpoint_reset, run_checkpoint_show};
use crate::commands::common::{resolve_config_path, resolve_db_path};
use crate::commands::completions::run_completions;
use crate::commands::conflicts::{run_conflicts_list, run_conflicts_prune, run_conflicts_resolve};
use crate::commands::daemon::run_daemon;
use crate::commands::edit::run_edit;
use crate::commands::list::run_list;
use crate::commands::log::run_log;
use crate::commands::record::run_record;
use crate::commands::retry::run_retry;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scoresync=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let config_path = resolve_config_path(cli.config);

    match cli.command {
        Commands::Record(args) => run_record(args, &db_path)?,
        Commands::Edit(args) => run_edit(&args, &db_path)?,
        Commands::List {
            status,
            limit,
            json,
        } => run_list(status, limit, json, &db_path)?,
        Commands::Status { json } => run_status(json, &db_path)?,
        Commands::Sync { json } => run_sync(json, &db_path, &config_path).await?,
        Commands::Retry => run_retry(&db_path)?,
        Commands::Conflicts { command } => match command {
            ConflictsCommand::List { all, limit, json } => {
                run_conflicts_list(all, limit, json, &db_path)?;
            }
            ConflictsCommand::Resolve { id, resolution } => {
                run_conflicts_resolve(id, resolution, &db_path, &config_path)?;
            }
            ConflictsCommand::Prune { days } => run_conflicts_prune(days, &db_path, &config_path)?,
        },
        Commands::Log { limit, json } => run_log(limit, json, &db_path)?,
        Commands::Checkpoint { command } => match command {
            CheckpointCommand::Show { json } => run_checkpoint_show(json, &db_path)?,
            CheckpointCommand::Reset => run_checkpoint_reset(&db_path)?,
        },
        Commands::Daemon => run_daemon(&db_path, &config_path).await?,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}
