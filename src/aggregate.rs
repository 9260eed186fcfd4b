//! Completion percentage over a set of derived day statuses.
//!
//! Every day except `not_applicable` counts as scheduled. Contributions:
//! `completed` 1, `partial` quantity/benchmark (uncapped), `delayed` a flat 0.5,
//! anything else 0. The result is `round(100 * sum / scheduled)`, or 0 when
//! nothing was scheduled.

use std::collections::HashMap;

use crate::fields::DayStatus;

/// Half credit for work that happened, just not on time.
const DELAYED_CREDIT: f64 = 0.5;

/// One day's input to the percentage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayScore {
    pub status: DayStatus,
    pub quantity: Option<f64>,
    pub benchmark: Option<f64>,
}

impl DayScore {
    pub fn of(status: DayStatus) -> Self {
        DayScore { status, quantity: None, benchmark: None }
    }

    pub fn contribution(&self) -> f64 {
        match self.status {
            DayStatus::Completed => 1.0,
            DayStatus::Partial => match (self.quantity, self.benchmark) {
                (Some(q), Some(b)) if b > 0.0 => q / b,
                // No benchmark to measure against.
                _ => DELAYED_CREDIT,
            },
            DayStatus::Delayed => DELAYED_CREDIT,
            DayStatus::NotApplicable
            | DayStatus::Scheduled
            | DayStatus::Pending
            | DayStatus::NotDone => 0.0,
        }
    }
}

pub fn completion_percentage(days: &[DayScore]) -> u32 {
    let scheduled: Vec<&DayScore> = days
        .iter()
        .filter(|d| d.status != DayStatus::NotApplicable)
        .collect();
    if scheduled.is_empty() {
        return 0;
    }
    let total: f64 = scheduled.iter().map(|d| d.contribution()).sum();
    (100.0 * total / scheduled.len() as f64).round() as u32
}

/// Per-status counts plus the percentage, for reports.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub counts: HashMap<DayStatus, usize>,
    pub scheduled: usize,
    pub percentage: u32,
}

impl Summary {
    pub fn count(&self, status: DayStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }
}

pub fn summarize(days: &[DayScore]) -> Summary {
    let mut counts = HashMap::new();
    for day in days {
        *counts.entry(day.status).or_insert(0) += 1;
    }
    let scheduled = days.len() - counts.get(&DayStatus::NotApplicable).copied().unwrap_or(0);
    Summary {
        counts,
        scheduled,
        percentage: completion_percentage(days),
    }
}
