//! Enumerations and field types for recurring task tracking.
//!
//! This module defines the value types shared by the engine and the CLI: the
//! recurrence frequency, stored completion states, approval states, the derived
//! per-day status, delegation classification and non-working-day reasons.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Recurrence frequency of a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RecurrenceKind {
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Custom,
}

/// State stored on a completion record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Completed,
    Partial,
    NotDone,
}

impl CompletionStatus {
    /// Whether this state resolves the obligation for its scheduled date.
    pub fn is_resolving(self) -> bool {
        matches!(self, CompletionStatus::Completed | CompletionStatus::Partial)
    }
}

/// Manager review state of a completion record.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// Derived status of an assignment on one calendar date.
///
/// `Delayed` and `Pending` are never stored; they come out of the status engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    NotApplicable,
    Scheduled,
    Pending,
    Completed,
    Partial,
    NotDone,
    Delayed,
}

impl DayStatus {
    pub const ALL: [DayStatus; 7] = [
        DayStatus::NotApplicable,
        DayStatus::Scheduled,
        DayStatus::Pending,
        DayStatus::Completed,
        DayStatus::Partial,
        DayStatus::NotDone,
        DayStatus::Delayed,
    ];
}

impl From<CompletionStatus> for DayStatus {
    fn from(s: CompletionStatus) -> Self {
        match s {
            CompletionStatus::Completed => DayStatus::Completed,
            CompletionStatus::Partial => DayStatus::Partial,
            CompletionStatus::NotDone => DayStatus::NotDone,
        }
    }
}

/// Position of the assignee relative to the assigner in the management hierarchy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DelegationType {
    #[serde(rename = "self")]
    SelfAssigned,
    Downward,
    Upward,
    Peer,
}

/// Why a date is not a working day for a user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OffReason {
    WeeklyOff,
    PublicHoliday,
    PersonalHoliday,
}

impl fmt::Display for OffReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OffReason::WeeklyOff => "Weekly Off",
            OffReason::PublicHoliday => "Public Holiday",
            OffReason::PersonalHoliday => "Personal Holiday",
        })
    }
}

/// Weekday number used throughout the data model: 0 = Sunday .. 6 = Saturday.
pub fn weekday_number(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Parse comma-separated weekdays given as numbers (0 = Sunday) or names.
pub fn parse_weekdays(inputs: &[String]) -> Result<BTreeSet<u8>, String> {
    let mut days = BTreeSet::new();
    for raw in inputs {
        for part in raw.split(',') {
            let part = part.trim().to_lowercase();
            if part.is_empty() {
                continue;
            }
            let day = if let Ok(n) = part.parse::<u8>() {
                n
            } else {
                WEEKDAY_NAMES
                    .iter()
                    .position(|name| part.starts_with(name))
                    .map(|i| i as u8)
                    .ok_or_else(|| format!("unknown weekday '{part}'"))?
            };
            if day > 6 {
                return Err(format!("weekday {day} out of range 0..6"));
            }
            days.insert(day);
        }
    }
    Ok(days)
}

/// Format a weekday set for display ("sun,sat").
pub fn format_weekdays(days: &BTreeSet<u8>) -> String {
    if days.is_empty() {
        return "-".into();
    }
    days.iter()
        .map(|&d| WEEKDAY_NAMES.get(d as usize).copied().unwrap_or("?"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Format a derived status for display.
pub fn format_day_status(s: DayStatus) -> &'static str {
    match s {
        DayStatus::NotApplicable => "-",
        DayStatus::Scheduled => "Scheduled",
        DayStatus::Pending => "Pending",
        DayStatus::Completed => "Completed",
        DayStatus::Partial => "Partial",
        DayStatus::NotDone => "Not Done",
        DayStatus::Delayed => "Delayed",
    }
}

/// Format an approval state for display.
pub fn format_approval(s: Option<ApprovalStatus>) -> &'static str {
    match s {
        Some(ApprovalStatus::Pending) => "Pending",
        Some(ApprovalStatus::Approved) => "Approved",
        Some(ApprovalStatus::Rejected) => "Rejected",
        None => "-",
    }
}

/// Format a delegation type for display.
pub fn format_delegation(d: DelegationType) -> &'static str {
    match d {
        DelegationType::SelfAssigned => "Self",
        DelegationType::Downward => "Downward",
        DelegationType::Upward => "Upward",
        DelegationType::Peer => "Peer",
    }
}
