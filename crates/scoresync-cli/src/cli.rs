use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use scoresync_core::models::Resolution;
use scoresync_core::SyncStatus;

#[derive(Parser)]
#[command(name = "scoresync")]
#[command(about = "Queue game scores offline and sync them to the score API")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the sync settings file (JSON)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue a completed game for upload
    #[command(alias = "add")]
    Record(RecordArgs),
    /// Change a queued score locally
    Edit(EditArgs),
    /// List queued scores
    List {
        /// Only show scores in this sync state
        #[arg(long, value_enum)]
        status: Option<StatusFilter>,
        /// Number of scores to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show queue counts and the last sync round
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one sync round now
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move scores that gave up back to the queue
    Retry,
    /// Inspect and resolve sync conflicts
    Conflicts {
        #[command(subcommand)]
        command: ConflictsCommand,
    },
    /// Show recent sync rounds
    Log {
        /// Number of rounds to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or reset the sync checkpoint
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommand,
    },
    /// Run scheduled sync rounds until interrupted
    Daemon,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
pub struct RecordArgs {
    /// Learner the score belongs to
    #[arg(long)]
    pub owner: String,
    /// Game identifier
    #[arg(long)]
    pub game: String,
    /// Points scored
    pub score: i64,
    #[arg(long, default_value = "100")]
    pub max_score: i64,
    #[arg(long, default_value = "0")]
    pub correct: u32,
    #[arg(long, default_value = "0")]
    pub total: u32,
    /// Play time in milliseconds
    #[arg(long, default_value = "0")]
    pub duration_ms: i64,
    #[arg(long)]
    pub level: Option<u32>,
    /// Extra metadata as key=value (repeatable)
    #[arg(long = "meta", value_name = "KEY=VALUE")]
    pub metadata: Vec<String>,
    /// When the game was played (Unix ms); defaults to now
    #[arg(long, value_name = "UNIX_MS")]
    pub played_at: Option<i64>,
}

#[derive(clap::Args)]
pub struct EditArgs {
    /// Score record ID
    pub id: String,
    #[arg(long)]
    pub score: Option<i64>,
    #[arg(long)]
    pub max_score: Option<i64>,
    #[arg(long)]
    pub correct: Option<u32>,
    #[arg(long)]
    pub total: Option<u32>,
    #[arg(long)]
    pub duration_ms: Option<i64>,
    #[arg(long)]
    pub level: Option<u32>,
    /// Set metadata as key=value (repeatable); an empty value removes the key
    #[arg(long = "meta", value_name = "KEY=VALUE")]
    pub metadata: Vec<String>,
}

#[derive(Subcommand)]
pub enum ConflictsCommand {
    /// List conflicts (unresolved only unless --all)
    List {
        #[arg(long)]
        all: bool,
        #[arg(short, long, default_value = "20")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Resolve a conflict by ID
    Resolve {
        id: i64,
        #[arg(value_enum)]
        resolution: ResolutionChoice,
    },
    /// Delete resolved conflicts and old sync logs
    Prune {
        /// Retention horizon in days (defaults to the configured value)
        #[arg(long)]
        days: Option<u32>,
    },
}

#[derive(Subcommand)]
pub enum CheckpointCommand {
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Force the next round to be a full sync
    Reset,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StatusFilter {
    Pending,
    Synced,
    Conflict,
    Error,
}

impl From<StatusFilter> for SyncStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Pending => Self::Pending,
            StatusFilter::Synced => Self::Synced,
            StatusFilter::Conflict => Self::Conflict,
            StatusFilter::Error => Self::Error,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ResolutionChoice {
    KeepLocal,
    KeepServer,
    Merge,
}

impl From<ResolutionChoice> for Resolution {
    fn from(choice: ResolutionChoice) -> Self {
        match choice {
            ResolutionChoice::KeepLocal => Self::KeepLocal,
            ResolutionChoice::KeepServer => Self::KeepServer,
            ResolutionChoice::Merge => Self::Merge,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
