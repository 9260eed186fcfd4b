//! Working-day calendar.
//!
//! A [`UserCalendar`] is a snapshot of everything that decides whether a user
//! works on a given date: their weekly offs (user override, else the org-wide
//! set), public holidays and approved personal leave. It is loaded once from an
//! [`OrgCalendarStore`] and then answers date queries without further reads.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::fields::{weekday_number, OffReason};
use crate::store::OrgCalendarStore;
use crate::task::LeaveInterval;

/// Default bound on the forward search in [`UserCalendar::next_working_day`].
pub const DEFAULT_SEARCH_LIMIT: u32 = 365;

/// Outcome of a working-day check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkingDay {
    Working,
    Off(OffReason),
}

impl WorkingDay {
    pub fn is_working(self) -> bool {
        matches!(self, WorkingDay::Working)
    }

    pub fn reason(self) -> Option<OffReason> {
        match self {
            WorkingDay::Working => None,
            WorkingDay::Off(reason) => Some(reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserCalendar {
    pub user_id: u64,
    weekly_off: BTreeSet<u8>,
    holidays: BTreeSet<NaiveDate>,
    leave: Vec<LeaveInterval>,
}

impl UserCalendar {
    pub fn new(
        user_id: u64,
        weekly_off: BTreeSet<u8>,
        holidays: BTreeSet<NaiveDate>,
        leave: Vec<LeaveInterval>,
    ) -> Self {
        UserCalendar { user_id, weekly_off, holidays, leave }
    }

    /// Load a user's calendar. An existing override replaces the org default,
    /// even when it is empty.
    pub fn load<S: OrgCalendarStore + ?Sized>(store: &S, user_id: u64) -> EngineResult<Self> {
        let weekly_off = match store.user_weekly_off_override(user_id)? {
            Some(days) => days,
            None => store.org_weekly_off()?,
        };
        Ok(UserCalendar::new(
            user_id,
            weekly_off,
            store.public_holidays()?,
            store.approved_leave(user_id)?,
        ))
    }

    pub fn weekly_off(&self) -> &BTreeSet<u8> {
        &self.weekly_off
    }

    /// First matching rule wins: weekly off, then public holiday, then leave.
    pub fn check(&self, date: NaiveDate) -> WorkingDay {
        if self.weekly_off.contains(&weekday_number(date)) {
            WorkingDay::Off(OffReason::WeeklyOff)
        } else if self.holidays.contains(&date) {
            WorkingDay::Off(OffReason::PublicHoliday)
        } else if self.leave.iter().any(|l| l.contains(date)) {
            WorkingDay::Off(OffReason::PersonalHoliday)
        } else {
            WorkingDay::Working
        }
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        self.check(date).is_working()
    }

    /// The first working day strictly after `date`, looking at most
    /// `search_limit` days ahead.
    pub fn next_working_day(&self, date: NaiveDate, search_limit: u32) -> EngineResult<NaiveDate> {
        let mut candidate = date;
        for _ in 0..search_limit {
            candidate = match candidate.succ_opt() {
                Some(next) => next,
                None => break,
            };
            if self.is_working_day(candidate) {
                return Ok(candidate);
            }
        }
        warn!(user_id = self.user_id, %date, search_limit, "no working day found");
        Err(EngineError::NoWorkingDayFound {
            user_id: self.user_id,
            from: date,
            searched: search_limit,
        })
    }
}
