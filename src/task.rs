//! Records for recurring tasks, their assignments and completions.
//!
//! `Task` carries its recurrence as a tagged union keyed by frequency. The
//! union is deliberately permissive about values (an out-of-range weekday still
//! deserializes) so that a broken record loads and is rejected later by
//! [`crate::recurrence::RecurrenceRule::compile`] instead of failing the whole store.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::fields::*;

/// A person in the organisation. `manager` links form the hierarchy used to
/// classify assignments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub manager: Option<u64>,
    /// User-level weekly-off override. `Some(empty)` means "no weekly offs",
    /// not "use the org default".
    #[serde(default)]
    pub weekly_off: Option<BTreeSet<u8>>,
}

/// A recurring (or one-off) work obligation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub name: String,
    /// Positive target quantity, when the task is measured rather than binary.
    pub benchmark: Option<f64>,
    /// Occurrences are computed relative to this date; it never changes.
    pub anchor_date: NaiveDate,
    pub recurrence: RecurrenceConfig,
    pub created_at_utc: i64,
}

impl Task {
    pub fn kind(&self) -> RecurrenceKind {
        self.recurrence.kind()
    }
}

fn default_interval() -> u32 {
    1
}

/// Recurrence definition, one shape per frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RecurrenceConfig {
    None,
    Daily {
        #[serde(default = "default_interval")]
        interval: u32,
        #[serde(default)]
        end: RecurrenceEnd,
    },
    Weekly {
        #[serde(default = "default_interval")]
        interval: u32,
        #[serde(default)]
        days_of_week: BTreeSet<u8>,
        #[serde(default)]
        end: RecurrenceEnd,
    },
    Monthly {
        #[serde(default = "default_interval")]
        interval: u32,
        #[serde(default)]
        day_of_month: Option<u8>,
        #[serde(default)]
        ordinal: Option<i8>,
        #[serde(default)]
        weekday: Option<u8>,
        #[serde(default)]
        end: RecurrenceEnd,
    },
    Yearly {
        #[serde(default = "default_interval")]
        interval: u32,
        #[serde(default)]
        end: RecurrenceEnd,
    },
    /// Interval-only generalisation of daily ("every N days").
    Custom {
        #[serde(default = "default_interval")]
        interval: u32,
        #[serde(default)]
        end: RecurrenceEnd,
    },
}

impl RecurrenceConfig {
    pub fn kind(&self) -> RecurrenceKind {
        match self {
            RecurrenceConfig::None => RecurrenceKind::None,
            RecurrenceConfig::Daily { .. } => RecurrenceKind::Daily,
            RecurrenceConfig::Weekly { .. } => RecurrenceKind::Weekly,
            RecurrenceConfig::Monthly { .. } => RecurrenceKind::Monthly,
            RecurrenceConfig::Yearly { .. } => RecurrenceKind::Yearly,
            RecurrenceConfig::Custom { .. } => RecurrenceKind::Custom,
        }
    }

    /// Short human description ("every 2 weeks on mon,fri").
    pub fn describe(&self) -> String {
        let every = |interval: u32, unit: &str| {
            if interval == 1 {
                format!("every {unit}")
            } else {
                format!("every {interval} {unit}s")
            }
        };
        match self {
            RecurrenceConfig::None => "once".into(),
            RecurrenceConfig::Daily { interval, .. } | RecurrenceConfig::Custom { interval, .. } => {
                every(*interval, "day")
            }
            RecurrenceConfig::Weekly { interval, days_of_week, .. } => {
                format!("{} on {}", every(*interval, "week"), format_weekdays(days_of_week))
            }
            RecurrenceConfig::Monthly { interval, day_of_month: Some(d), .. } => {
                format!("{} on day {d}", every(*interval, "month"))
            }
            RecurrenceConfig::Monthly { interval, ordinal, weekday, .. } => {
                let which = match ordinal {
                    Some(-1) => "last".to_string(),
                    Some(-2) => "second-to-last".to_string(),
                    Some(n) => format!("#{n}"),
                    None => "?".to_string(),
                };
                let day = weekday
                    .map(|w| format_weekdays(&BTreeSet::from([w])))
                    .unwrap_or_else(|| "?".into());
                format!("{} on the {which} {day}", every(*interval, "month"))
            }
            RecurrenceConfig::Yearly { interval, .. } => every(*interval, "year"),
        }
    }
}

/// When a recurrence stops producing occurrences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecurrenceEnd {
    #[default]
    Never,
    /// Inclusive cutoff date.
    OnDate { date: NaiveDate },
    /// Maximum number of occurrences, counted from the first one.
    AfterOccurrences { count: u32 },
}

/// Who does a task, and who asked for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub id: u64,
    pub task_id: u64,
    pub assigned_to: u64,
    pub assigned_by: u64,
    pub delegation: DelegationType,
    pub created_at_utc: i64,
}

/// Composite key of a completion record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompletionKey {
    pub assignment_id: u64,
    pub scheduled_date: NaiveDate,
}

impl CompletionKey {
    pub fn new(assignment_id: u64, scheduled_date: NaiveDate) -> Self {
        CompletionKey { assignment_id, scheduled_date }
    }
}

/// The answer recorded for one obligation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCompletion {
    pub assignment_id: u64,
    /// Due date this record answers for.
    pub scheduled_date: NaiveDate,
    /// Date the action was recorded; never before `scheduled_date`.
    pub completion_date: NaiveDate,
    pub status: CompletionStatus,
    pub quantity_completed: Option<f64>,
    pub notes: Option<String>,
    #[serde(default)]
    pub approval_status: ApprovalStatus,
    #[serde(default)]
    pub manager_comment: Option<String>,
}

impl TaskCompletion {
    pub fn key(&self) -> CompletionKey {
        CompletionKey::new(self.assignment_id, self.scheduled_date)
    }

    /// Recorded after its scheduled date.
    pub fn is_late(&self) -> bool {
        self.completion_date > self.scheduled_date
    }
}

/// Fields written by a completion upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionFields {
    pub completion_date: NaiveDate,
    pub status: CompletionStatus,
    pub quantity_completed: Option<f64>,
    pub notes: Option<String>,
}

/// Directed edge: `task_id` cannot be completed before `depends_on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDependency {
    pub task_id: u64,
    pub depends_on: u64,
}

/// Personal leave, inclusive on both ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveInterval {
    pub id: u64,
    pub user_id: u64,
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub approved: bool,
}

impl LeaveInterval {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Every date in the range, in order. Empty when `end < start`.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}
