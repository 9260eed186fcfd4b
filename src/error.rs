//! Error taxonomy for the scheduling engine and its record store.

use chrono::NaiveDate;
use thiserror::Error;

/// Failures raised by a record store adapter. The engine never retries these.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed recurrence definition. Callers on the read path swallow this
    /// and treat the task as never scheduled.
    #[error("task {task_id} has an invalid recurrence: {reason}")]
    Configuration { task_id: u64, reason: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("cannot complete '{task}': waiting on {}", .blocking.join(", "))]
    DependencyUnmet { task: String, blocking: Vec<String> },

    #[error("no working day for user {user_id} within {searched} days after {from}")]
    NoWorkingDayFound {
        user_id: u64,
        from: NaiveDate,
        searched: u32,
    },

    #[error("dependency would create a cycle: {}", format_cycle(.0))]
    DependencyCycle(Vec<u64>),

    #[error("{0} not found")]
    NotFound(String),

    /// A name or ID given on the command line matched nothing, or too much.
    #[error("{0}")]
    Lookup(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

fn format_cycle(path: &[u64]) -> String {
    path.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type EngineResult<T> = Result<T, EngineError>;
