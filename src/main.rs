use std::path::PathBuf;

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cadence::cli::Cli;
use cadence::cmd::*;
use cadence::config::{self, Config, LoggingConfig};
use cadence::db::{parse_date_input, Database};
use cadence::error::{EngineError, EngineResult};

fn main() {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        cmd_completions(*shell);
        return;
    }

    let cfg = match config::load_default() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = init_tracing(&cfg.logging) {
        eprintln!("Failed to initialise logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(cli, &cfg) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }
    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(&logging.level).map_err(|e| e.to_string())?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| e.to_string())
}

fn run(cli: Cli, cfg: &Config) -> EngineResult<()> {
    let utc_today = Utc::now().date_naive();
    let today = match cli.as_of.as_deref() {
        Some(s) => parse_date_input(s, utc_today)
            .ok_or_else(|| EngineError::Validation(format!("unrecognised --as-of date '{s}'")))?,
        None => utc_today,
    };

    let db_path: PathBuf = match cli.db {
        Some(path) => path,
        None => cfg
            .db_path()
            .map_err(|e| EngineError::Validation(e.to_string()))?,
    };
    let mut db = Database::load(&db_path)?
        .unwrap_or_else(|| Database::with_weekly_off(cfg.calendar.default_weekly_off.clone()));
    let settings = cfg.engine;

    match cli.command {
        Commands::User { action } => cmd_user(&mut db, &db_path, action),
        Commands::Task { action } => cmd_task(&mut db, &db_path, action, today),
        Commands::Assign { task, to, by } => cmd_assign(&mut db, &db_path, task, to, by),
        Commands::Depend { task, on } => cmd_depend(&mut db, &db_path, task, on),
        Commands::Holiday { date, name } => cmd_holiday(&mut db, &db_path, date, name, today),
        Commands::Leave { action } => cmd_leave(&mut db, &db_path, action, today),
        Commands::WeeklyOff { user, org, days, clear } =>
            cmd_weekly_off(&mut db, &db_path, user, org, days, clear),
        Commands::Status { assignment, date } => cmd_status(&db, settings, assignment, date, today),
        Commands::Month { assignment, month } => cmd_month(&db, settings, assignment, month, today),
        Commands::Pending { user } => cmd_pending(&db, settings, user, today),
        Commands::Complete { assignment, date, status, quantity, not_done, notes } =>
            cmd_complete(&mut db, &db_path, assignment, date, status, quantity, not_done, notes, today),
        Commands::Review { assignment, date, reject, comment } =>
            cmd_review(&mut db, &db_path, assignment, date, reject, comment, today),
        Commands::NextWorkingDay { user, date } => cmd_next_working_day(&db, settings, user, date, today),
        Commands::Completions { .. } => unreachable!("completions handled before loading the database"),
    }
}
