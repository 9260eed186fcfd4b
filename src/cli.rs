use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// File-backed tracker for recurring work obligations.
/// Storage defaults to ~/.cadence/cadence.json or a path passed via --db.
#[derive(Parser)]
#[command(name = "cadence", version, about = "Recurring task status tracker")]
pub struct Cli {
    /// Path to the JSON database file.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Evaluate as of this date instead of today (UTC).
    #[arg(long, global = true)]
    pub as_of: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}
