//! # Cadence - recurring work obligations
//!
//! Tracks recurring tasks assigned to people and answers, for any calendar
//! date: *is this task due, and what is its completion state?*
//!
//! ## Key Pieces
//!
//! - **Recurrence**: daily, weekly (day sets), monthly (fixed day or "last
//!   Friday"), yearly and every-N-days rules with date or count end conditions
//! - **Working-day calendar**: weekly offs (per user or org-wide), public
//!   holidays and approved personal leave
//! - **Status engine**: one status per assignment and date, `delayed` for late
//!   completions, a pending list of unresolved past obligations, and
//!   dependency-gated completion writes
//! - **Aggregation**: weighted completion percentage over any set of days
//!
//! ## Quick Start
//!
//! ```bash
//! cadence user add "Priya"
//! cadence task add "Cash count" --repeat weekly --days mon,wed,fri
//! cadence assign "Cash count" --to Priya
//! cadence complete 1 --date yesterday
//! cadence month 1
//! cadence pending Priya
//! ```
//!
//! Data is stored in `~/.cadence/cadence.json` unless `--db` or `CADENCE_DB`
//! says otherwise. Every engine call takes an explicit `today`; the CLI passes
//! the current UTC date or `--as-of`.

pub mod aggregate;
pub mod calendar;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod db;
pub mod dependency;
pub mod error;
pub mod fields;
pub mod recurrence;
pub mod status;
pub mod store;
pub mod task;
