//! Recurrence evaluation.
//!
//! A task's [`RecurrenceConfig`] is compiled into a [`RecurrenceRule`], which
//! answers "is this calendar date an occurrence?". All arithmetic is on
//! `NaiveDate`, so time of day and timezone can never change an answer.
//!
//! Weeks start on Monday when counting weekly intervals, so "every 2 weeks on
//! Mon and Sun" treats a Sunday as the end of its Monday-based week.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::fields::weekday_number;
use crate::task::{DateRange, RecurrenceConfig, RecurrenceEnd, Task};

const VALID_ORDINALS: [i8; 6] = [1, 2, 3, 4, -1, -2];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    Once,
    EveryNDays(u32),
    Weekly { interval: u32, days: BTreeSet<u8> },
    MonthlyDay { interval: u32, day: u32 },
    MonthlyWeekday { interval: u32, ordinal: i8, weekday: u8 },
    Yearly { interval: u32 },
}

/// A validated recurrence anchored at a task's anchor date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    anchor: NaiveDate,
    pattern: Pattern,
    end: RecurrenceEnd,
}

impl RecurrenceRule {
    /// Validate a task's recurrence. Fails with [`EngineError::Configuration`]
    /// when the definition is malformed.
    pub fn compile(task: &Task) -> EngineResult<Self> {
        let invalid = |reason: String| EngineError::Configuration { task_id: task.id, reason };
        let check_interval = |interval: u32| {
            if interval == 0 {
                Err(invalid("interval must be at least 1".into()))
            } else {
                Ok(interval)
            }
        };

        let (pattern, end) = match &task.recurrence {
            RecurrenceConfig::None => (Pattern::Once, RecurrenceEnd::Never),
            RecurrenceConfig::Daily { interval, end } | RecurrenceConfig::Custom { interval, end } => {
                (Pattern::EveryNDays(check_interval(*interval)?), *end)
            }
            RecurrenceConfig::Weekly { interval, days_of_week, end } => {
                if let Some(bad) = days_of_week.iter().find(|&&d| d > 6) {
                    return Err(invalid(format!("weekday {bad} out of range 0..6")));
                }
                // An unconfigured weekly rule repeats on the anchor's weekday.
                let days = if days_of_week.is_empty() {
                    BTreeSet::from([weekday_number(task.anchor_date)])
                } else {
                    days_of_week.clone()
                };
                let interval = check_interval(*interval)?;
                (Pattern::Weekly { interval, days }, *end)
            }
            RecurrenceConfig::Monthly { interval, day_of_month, ordinal, weekday, end } => {
                let interval = check_interval(*interval)?;
                let pattern = match (day_of_month, ordinal, weekday) {
                    (Some(day), None, None) => {
                        if !(1..=31).contains(day) {
                            return Err(invalid(format!("day of month {day} out of range 1..31")));
                        }
                        Pattern::MonthlyDay { interval, day: u32::from(*day) }
                    }
                    (None, Some(ordinal), Some(weekday)) => {
                        if !VALID_ORDINALS.contains(ordinal) {
                            return Err(invalid(format!("ordinal {ordinal} not one of 1,2,3,4,-1,-2")));
                        }
                        if *weekday > 6 {
                            return Err(invalid(format!("weekday {weekday} out of range 0..6")));
                        }
                        Pattern::MonthlyWeekday { interval, ordinal: *ordinal, weekday: *weekday }
                    }
                    _ => {
                        return Err(invalid(
                            "monthly needs either day_of_month or ordinal with weekday".into(),
                        ))
                    }
                };
                (pattern, *end)
            }
            RecurrenceConfig::Yearly { interval, end } => {
                (Pattern::Yearly { interval: check_interval(*interval)? }, *end)
            }
        };

        if let RecurrenceEnd::AfterOccurrences { count: 0 } = end {
            return Err(invalid("occurrence count must be at least 1".into()));
        }

        Ok(RecurrenceRule { anchor: task.anchor_date, pattern, end })
    }

    pub fn anchor(&self) -> NaiveDate {
        self.anchor
    }

    /// Whether `date` is an occurrence, end condition included.
    pub fn applies_on(&self, date: NaiveDate) -> bool {
        if !self.matches(date) {
            return false;
        }
        match self.end {
            RecurrenceEnd::Never => true,
            RecurrenceEnd::OnDate { date: until } => date <= until,
            RecurrenceEnd::AfterOccurrences { count } => {
                let position = DateRange::new(self.anchor, date)
                    .days()
                    .filter(|d| self.matches(*d))
                    .count();
                position <= count as usize
            }
        }
    }

    /// Every occurrence inside `range`, in date order.
    pub fn occurrences_between(&self, range: DateRange) -> Vec<NaiveDate> {
        match self.end {
            RecurrenceEnd::AfterOccurrences { count } => {
                // One pass from the anchor so the count is evaluated once.
                DateRange::new(self.anchor, range.end)
                    .days()
                    .filter(|d| self.matches(*d))
                    .take(count as usize)
                    .filter(|d| range.contains(*d))
                    .collect()
            }
            _ => range.days().filter(|d| self.applies_on(*d)).collect(),
        }
    }

    /// Pattern match ignoring the end condition.
    fn matches(&self, date: NaiveDate) -> bool {
        if date < self.anchor {
            return false;
        }
        match &self.pattern {
            Pattern::Once => date == self.anchor,
            Pattern::EveryNDays(n) => (date - self.anchor).num_days() % i64::from(*n) == 0,
            Pattern::Weekly { interval, days } => {
                days.contains(&weekday_number(date))
                    && weeks_between(self.anchor, date) % i64::from(*interval) == 0
            }
            Pattern::MonthlyDay { interval, day } => {
                date.day() == *day && months_between(self.anchor, date) % i64::from(*interval) == 0
            }
            Pattern::MonthlyWeekday { interval, ordinal, weekday } => {
                weekday_number(date) == *weekday
                    && weekday_ordinal_matches(date, *ordinal)
                    && months_between(self.anchor, date) % i64::from(*interval) == 0
            }
            Pattern::Yearly { interval } => {
                date.month() == self.anchor.month()
                    && date.day() == self.anchor.day()
                    && i64::from(date.year() - self.anchor.year()) % i64::from(*interval) == 0
            }
        }
    }
}

/// Whether `task` is due on `date`. A malformed recurrence is logged and
/// treated as never scheduled.
pub fn applies_on_date(task: &Task, date: NaiveDate) -> bool {
    match RecurrenceRule::compile(task) {
        Ok(rule) => rule.applies_on(date),
        Err(e) => {
            warn!(task_id = task.id, error = %e, "skipping task with malformed recurrence");
            false
        }
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - chrono::Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn weeks_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (week_start(to) - week_start(from)).num_days() / 7
}

fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    i64::from(to.year() - from.year()) * 12 + i64::from(to.month()) - i64::from(from.month())
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (y, m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}

/// `ordinal` counts from the start (1..4) or the end (-1 = last, -2 = second to last).
fn weekday_ordinal_matches(date: NaiveDate, ordinal: i8) -> bool {
    let day = date.day();
    if ordinal > 0 {
        ((day - 1) / 7 + 1) as i8 == ordinal
    } else {
        ((days_in_month(date) - day) / 7 + 1) as i8 == -ordinal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn task(anchor: NaiveDate, recurrence: RecurrenceConfig) -> Task {
        Task {
            id: 1,
            name: "Check stock".into(),
            benchmark: None,
            anchor_date: anchor,
            recurrence,
            created_at_utc: 0,
        }
    }

    fn weekly(days: &[u8], interval: u32) -> RecurrenceConfig {
        RecurrenceConfig::Weekly {
            interval,
            days_of_week: days.iter().copied().collect(),
            end: RecurrenceEnd::Never,
        }
    }

    #[test]
    fn test_none_applies_only_on_anchor() {
        let t = task(d(2025, 6, 10), RecurrenceConfig::None);
        let hits: Vec<_> = DateRange::new(d(2025, 5, 1), d(2025, 8, 1))
            .days()
            .filter(|day| applies_on_date(&t, *day))
            .collect();
        assert_eq!(hits, vec![d(2025, 6, 10)]);
    }

    #[test]
    fn test_weekly_mon_wed_fri_over_two_weeks() {
        // Anchor on a Thursday so the window straddles week boundaries.
        let anchor = d(2025, 6, 12);
        let t = task(anchor, weekly(&[1, 3, 5], 1));
        let window = DateRange::new(anchor, anchor + chrono::Duration::days(13));
        let hits: Vec<_> = window.days().filter(|day| applies_on_date(&t, *day)).collect();
        assert_eq!(hits.len(), 6);
        assert!(hits.iter().all(|h| [1, 3, 5].contains(&weekday_number(*h))));
    }

    #[test]
    fn test_weekly_interval_skips_alternate_weeks() {
        // 2025-06-02 is a Monday.
        let t = task(d(2025, 6, 2), weekly(&[1], 2));
        let rule = RecurrenceRule::compile(&t).unwrap();
        assert!(rule.applies_on(d(2025, 6, 2)));
        assert!(!rule.applies_on(d(2025, 6, 9)));
        assert!(rule.applies_on(d(2025, 6, 16)));
    }

    #[test]
    fn test_weekly_without_days_uses_anchor_weekday() {
        let t = task(d(2025, 6, 4), weekly(&[], 1));
        let rule = RecurrenceRule::compile(&t).unwrap();
        assert!(rule.applies_on(d(2025, 6, 11)));
        assert!(!rule.applies_on(d(2025, 6, 12)));
    }

    #[test]
    fn test_daily_and_custom_intervals() {
        let daily = task(
            d(2025, 1, 30),
            RecurrenceConfig::Daily { interval: 1, end: RecurrenceEnd::Never },
        );
        assert!(applies_on_date(&daily, d(2025, 2, 1)));
        assert!(!applies_on_date(&daily, d(2025, 1, 29)));

        let every_third = task(
            d(2025, 1, 30),
            RecurrenceConfig::Custom { interval: 3, end: RecurrenceEnd::Never },
        );
        assert!(applies_on_date(&every_third, d(2025, 2, 2)));
        assert!(!applies_on_date(&every_third, d(2025, 2, 3)));
    }

    #[test]
    fn test_monthly_day_31_skips_short_months() {
        let t = task(
            d(2025, 1, 31),
            RecurrenceConfig::Monthly {
                interval: 1,
                day_of_month: Some(31),
                ordinal: None,
                weekday: None,
                end: RecurrenceEnd::Never,
            },
        );
        let rule = RecurrenceRule::compile(&t).unwrap();
        let hits = rule.occurrences_between(DateRange::new(d(2025, 2, 1), d(2025, 5, 31)));
        assert_eq!(hits, vec![d(2025, 3, 31), d(2025, 5, 31)]);
    }

    #[test]
    fn test_monthly_last_and_second_to_last_friday() {
        let last = task(
            d(2025, 1, 1),
            RecurrenceConfig::Monthly {
                interval: 1,
                day_of_month: None,
                ordinal: Some(-1),
                weekday: Some(5),
                end: RecurrenceEnd::Never,
            },
        );
        let rule = RecurrenceRule::compile(&last).unwrap();
        assert_eq!(
            rule.occurrences_between(DateRange::new(d(2025, 5, 1), d(2025, 5, 31))),
            vec![d(2025, 5, 30)]
        );

        let mut second_last = last.clone();
        second_last.recurrence = RecurrenceConfig::Monthly {
            interval: 1,
            day_of_month: None,
            ordinal: Some(-2),
            weekday: Some(5),
            end: RecurrenceEnd::Never,
        };
        assert!(applies_on_date(&second_last, d(2025, 5, 23)));
        assert!(!applies_on_date(&second_last, d(2025, 5, 30)));
    }

    #[test]
    fn test_monthly_first_monday_every_other_month() {
        let t = task(
            d(2025, 1, 1),
            RecurrenceConfig::Monthly {
                interval: 2,
                day_of_month: None,
                ordinal: Some(1),
                weekday: Some(1),
                end: RecurrenceEnd::Never,
            },
        );
        let rule = RecurrenceRule::compile(&t).unwrap();
        assert!(rule.applies_on(d(2025, 1, 6)));
        assert!(!rule.applies_on(d(2025, 2, 3)));
        assert!(rule.applies_on(d(2025, 3, 3)));
    }

    #[test]
    fn test_yearly_leap_day_only_in_leap_years() {
        let t = task(
            d(2024, 2, 29),
            RecurrenceConfig::Yearly { interval: 1, end: RecurrenceEnd::Never },
        );
        let rule = RecurrenceRule::compile(&t).unwrap();
        assert!(!rule.applies_on(d(2025, 2, 28)));
        assert!(!rule.applies_on(d(2025, 3, 1)));
        assert!(rule.applies_on(d(2028, 2, 29)));
    }

    #[test]
    fn test_end_on_date_is_inclusive() {
        let t = task(
            d(2025, 6, 1),
            RecurrenceConfig::Daily {
                interval: 1,
                end: RecurrenceEnd::OnDate { date: d(2025, 6, 5) },
            },
        );
        assert!(applies_on_date(&t, d(2025, 6, 5)));
        assert!(!applies_on_date(&t, d(2025, 6, 6)));
    }

    #[test]
    fn test_end_after_occurrences_counts_from_first() {
        let t = task(
            d(2025, 6, 2),
            RecurrenceConfig::Weekly {
                interval: 1,
                days_of_week: BTreeSet::from([1, 4]),
                end: RecurrenceEnd::AfterOccurrences { count: 3 },
            },
        );
        let rule = RecurrenceRule::compile(&t).unwrap();
        // Mon 2, Thu 5, Mon 9 are the three occurrences.
        assert!(rule.applies_on(d(2025, 6, 9)));
        assert!(!rule.applies_on(d(2025, 6, 12)));
        assert_eq!(
            rule.occurrences_between(DateRange::new(d(2025, 6, 4), d(2025, 6, 30))),
            vec![d(2025, 6, 5), d(2025, 6, 9)]
        );
    }

    #[test]
    fn test_malformed_configs_fail_closed() {
        let cases = [
            RecurrenceConfig::Daily { interval: 0, end: RecurrenceEnd::Never },
            weekly(&[7], 1),
            RecurrenceConfig::Monthly {
                interval: 1,
                day_of_month: Some(3),
                ordinal: Some(1),
                weekday: Some(1),
                end: RecurrenceEnd::Never,
            },
            RecurrenceConfig::Monthly {
                interval: 1,
                day_of_month: None,
                ordinal: Some(5),
                weekday: Some(1),
                end: RecurrenceEnd::Never,
            },
            RecurrenceConfig::Monthly {
                interval: 1,
                day_of_month: None,
                ordinal: None,
                weekday: None,
                end: RecurrenceEnd::Never,
            },
            RecurrenceConfig::Custom {
                interval: 1,
                end: RecurrenceEnd::AfterOccurrences { count: 0 },
            },
        ];
        for cfg in cases {
            let t = task(d(2025, 6, 2), cfg);
            assert!(matches!(
                RecurrenceRule::compile(&t),
                Err(EngineError::Configuration { task_id: 1, .. })
            ));
            assert!(!applies_on_date(&t, d(2025, 6, 2)));
        }
    }

    #[test]
    fn test_never_applies_before_anchor() {
        let t = task(d(2025, 6, 2), weekly(&[1], 1));
        assert!(!applies_on_date(&t, d(2025, 5, 26)));
    }
}
