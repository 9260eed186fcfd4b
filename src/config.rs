//! Configuration loading.
//!
//! Priority, highest first: environment variables, `~/.cadence/config.toml`,
//! `./cadence.toml`, built-in defaults. The `--db` flag on the command line
//! overrides the database path after loading.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::calendar::DEFAULT_SEARCH_LIMIT;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the JSON database file. Empty means `~/.cadence/cadence.json`.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub calendar: CalendarConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            logging: LoggingConfig::default(),
            engine: EngineConfig::default(),
            calendar: CalendarConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// EnvFilter string, e.g. "warn" or "cadence=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            level: default_logging_level(),
        }
    }
}

/// Knobs of the status engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How many calendar days before `today` the pending scan looks at.
    #[serde(default = "default_pending_lookback_days")]
    pub pending_lookback_days: u32,

    /// Bound on the forward search for the next working day.
    #[serde(default = "default_working_day_search_limit")]
    pub working_day_search_limit: u32,
}

fn default_pending_lookback_days() -> u32 {
    30
}

fn default_working_day_search_limit() -> u32 {
    DEFAULT_SEARCH_LIMIT
}

/// Upper bound for both engine day-count knobs (about ten years).
pub const MAX_ENGINE_DAYS: u32 = 3660;

impl EngineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pending_lookback_days > MAX_ENGINE_DAYS {
            anyhow::bail!(
                "engine.pending_lookback_days must be at most {MAX_ENGINE_DAYS}, got {}",
                self.pending_lookback_days
            );
        }
        if self.working_day_search_limit == 0 || self.working_day_search_limit > MAX_ENGINE_DAYS {
            anyhow::bail!(
                "engine.working_day_search_limit must be between 1 and {MAX_ENGINE_DAYS}, got {}",
                self.working_day_search_limit
            );
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pending_lookback_days: default_pending_lookback_days(),
            working_day_search_limit: default_working_day_search_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Org-wide weekly offs (0 = Sunday) written into a newly created database.
    #[serde(default = "default_weekly_off")]
    pub default_weekly_off: BTreeSet<u8>,
}

fn default_weekly_off() -> BTreeSet<u8> {
    BTreeSet::from([0])
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            default_weekly_off: default_weekly_off(),
        }
    }
}

/// Get the default data directory: ~/.cadence
pub fn data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".cadence"))
}

impl Config {
    /// Resolved database path.
    pub fn db_path(&self) -> anyhow::Result<PathBuf> {
        match &self.db_path {
            Some(p) if !p.as_os_str().is_empty() => Ok(p.clone()),
            _ => Ok(data_dir()?.join("cadence.json")),
        }
    }
}

pub fn load_default() -> anyhow::Result<Config> {
    let user_config = data_dir()?.join("config.toml");
    let mut cfg = load_layered(&user_config, Path::new("cadence.toml"))?;
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    Ok(cfg)
}

/// The first of `user_config` and `local_config` that exists, else defaults.
pub fn load_layered(user_config: &Path, local_config: &Path) -> anyhow::Result<Config> {
    if user_config.exists() {
        load_from(user_config)
    } else if local_config.exists() {
        load_from(local_config)
    } else {
        Ok(Config::default())
    }
}

pub fn load_from(path: &Path) -> anyhow::Result<Config> {
    let s = std::fs::read_to_string(path)?;
    let cfg = toml::from_str::<Config>(&s)
        .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?;
    cfg.engine
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?;
    Ok(cfg)
}

/// `CADENCE_DB` and `CADENCE_LOG`, read through `var`. Blank values are ignored.
pub fn apply_env_overrides(cfg: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("CADENCE_DB") {
        if !v.trim().is_empty() {
            cfg.db_path = Some(PathBuf::from(v.trim()));
        }
    }
    if let Some(v) = var("CADENCE_LOG") {
        if !v.trim().is_empty() {
            cfg.logging.level = v.trim().to_string();
        }
    }
}
