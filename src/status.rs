//! Status derivation for assignments.
//!
//! [`StatusEngine`] answers "what is the state of this assignment on this date?"
//! by combining the task's recurrence, the assignee's working-day calendar and
//! any stored completion. Every query takes an explicit `today`; the engine
//! never reads the clock.
//!
//! Precedence for a single date:
//! 1. a stored `completed`/`partial` record wins, shown as `delayed` when it
//!    was recorded after its scheduled date, even on a non-working day;
//! 2. a stored `not_done` record;
//! 3. otherwise the calendar and recurrence decide between `not_applicable`,
//!    `scheduled` (today or later) and `not_done` (past, nothing recorded).
//!
//! Writes go through [`set_completion`], which validates the request and gates
//! `completed`/`partial` on the task's direct dependencies.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDate};
use tracing::{debug, info, warn};

use crate::aggregate::DayScore;
use crate::calendar::{UserCalendar, WorkingDay};
use crate::config::{EngineConfig, MAX_ENGINE_DAYS};
use crate::dependency::ensure_dependencies_met;
use crate::error::{EngineError, EngineResult};
use crate::fields::*;
use crate::recurrence::RecurrenceRule;
use crate::store::Store;
use crate::task::*;

/// Status of one assignment on one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayEntry {
    pub date: NaiveDate,
    pub status: DayStatus,
}

/// One row of the monthly view.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthDay {
    pub date: NaiveDate,
    pub status: DayStatus,
    pub off_reason: Option<OffReason>,
    pub quantity_completed: Option<f64>,
    pub notes: Option<String>,
    pub approval_status: Option<ApprovalStatus>,
    pub manager_comment: Option<String>,
}

impl MonthDay {
    pub fn score(&self, benchmark: Option<f64>) -> DayScore {
        DayScore {
            status: self.status,
            quantity: self.quantity_completed,
            benchmark,
        }
    }
}

/// An unresolved past obligation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingObligation {
    pub assignment_id: u64,
    pub task_id: u64,
    pub task_name: String,
    pub date: NaiveDate,
    pub status: DayStatus,
}

/// Derive the status of one date from already-fetched inputs.
pub fn derive_status(
    completion: Option<&TaskCompletion>,
    day: WorkingDay,
    applies: bool,
    date: NaiveDate,
    today: NaiveDate,
) -> DayStatus {
    if let Some(c) = completion {
        return match c.status {
            CompletionStatus::Completed | CompletionStatus::Partial if c.is_late() => DayStatus::Delayed,
            status => status.into(),
        };
    }
    if !day.is_working() || !applies {
        DayStatus::NotApplicable
    } else if date >= today {
        DayStatus::Scheduled
    } else {
        DayStatus::NotDone
    }
}

/// Everything about one assignment that does not vary by date.
struct AssignmentContext {
    task: Task,
    rule: Option<RecurrenceRule>,
    calendar: UserCalendar,
}

impl AssignmentContext {
    fn applies_on(&self, date: NaiveDate) -> bool {
        self.rule.as_ref().is_some_and(|r| r.applies_on(date))
    }
}

pub struct StatusEngine<'a, S: ?Sized> {
    store: &'a S,
    settings: EngineConfig,
}

impl<'a, S: Store + ?Sized> StatusEngine<'a, S> {
    pub fn new(store: &'a S, settings: EngineConfig) -> Self {
        StatusEngine { store, settings }
    }

    fn context(&self, assignment: &TaskAssignment) -> EngineResult<AssignmentContext> {
        let task = self
            .store
            .task(assignment.task_id)?
            .ok_or_else(|| EngineError::NotFound(format!("task {}", assignment.task_id)))?;
        let rule = match RecurrenceRule::compile(&task) {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!(task_id = task.id, error = %e, "task is never scheduled");
                None
            }
        };
        let calendar = UserCalendar::load(self.store, assignment.assigned_to)?;
        Ok(AssignmentContext { task, rule, calendar })
    }

    /// Look up an assignment by ID.
    pub fn assignment(&self, assignment_id: u64) -> EngineResult<TaskAssignment> {
        self.store
            .assignment(assignment_id)?
            .ok_or_else(|| EngineError::NotFound(format!("assignment {assignment_id}")))
    }

    pub fn daily_status(
        &self,
        assignment: &TaskAssignment,
        date: NaiveDate,
        today: NaiveDate,
    ) -> EngineResult<DayStatus> {
        let ctx = self.context(assignment)?;
        let completion = self
            .store
            .get_completion(CompletionKey::new(assignment.id, date))?;
        let status = derive_status(
            completion.as_ref(),
            ctx.calendar.check(date),
            ctx.applies_on(date),
            date,
            today,
        );
        debug!(assignment_id = assignment.id, %date, ?status, "derived daily status");
        Ok(status)
    }

    /// Status of every date in `range`, reading completions once.
    pub fn range_statuses(
        &self,
        assignment: &TaskAssignment,
        range: DateRange,
        today: NaiveDate,
    ) -> EngineResult<Vec<DayEntry>> {
        let ctx = self.context(assignment)?;
        let completions = self.completions_by_key(&[assignment.id], range)?;
        Ok(range
            .days()
            .map(|date| DayEntry {
                date,
                status: derive_status(
                    completions.get(&CompletionKey::new(assignment.id, date)),
                    ctx.calendar.check(date),
                    ctx.applies_on(date),
                    date,
                    today,
                ),
            })
            .collect())
    }

    /// Every day of a month with the stored completion details alongside.
    pub fn month_view(
        &self,
        assignment: &TaskAssignment,
        year: i32,
        month: u32,
        today: NaiveDate,
    ) -> EngineResult<Vec<MonthDay>> {
        let range = month_range(year, month)
            .ok_or_else(|| EngineError::Validation(format!("invalid month {year}-{month:02}")))?;
        let ctx = self.context(assignment)?;
        let completions = self.completions_by_key(&[assignment.id], range)?;
        Ok(range
            .days()
            .map(|date| {
                let completion = completions.get(&CompletionKey::new(assignment.id, date));
                let day = ctx.calendar.check(date);
                MonthDay {
                    date,
                    status: derive_status(completion, day, ctx.applies_on(date), date, today),
                    off_reason: day.reason(),
                    quantity_completed: completion.and_then(|c| c.quantity_completed),
                    notes: completion.and_then(|c| c.notes.clone()),
                    approval_status: completion.map(|c| c.approval_status),
                    manager_comment: completion.and_then(|c| c.manager_comment.clone()),
                }
            })
            .collect())
    }

    /// Benchmark of an assignment's task, for aggregating its month view.
    pub fn benchmark(&self, assignment: &TaskAssignment) -> EngineResult<Option<f64>> {
        Ok(self.store.task(assignment.task_id)?.and_then(|t| t.benchmark))
    }

    /// Unresolved obligations on working days before `today`, within the
    /// configured lookback, oldest first.
    pub fn pending_obligations(
        &self,
        user_id: u64,
        today: NaiveDate,
    ) -> EngineResult<Vec<PendingObligation>> {
        let lookback = i64::from(self.settings.pending_lookback_days.min(MAX_ENGINE_DAYS));
        if lookback == 0 {
            return Ok(Vec::new());
        }
        let Some(end) = today.pred_opt() else {
            return Ok(Vec::new());
        };
        let start = Duration::try_days(lookback)
            .and_then(|back| today.checked_sub_signed(back))
            .unwrap_or(NaiveDate::MIN);
        let range = DateRange::new(start, end);
        let assignments = self.store.assignments_for_user(user_id)?;
        let ids: Vec<u64> = assignments.iter().map(|a| a.id).collect();
        let completions = self.completions_by_key(&ids, range)?;

        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for assignment in &assignments {
            let ctx = self.context(assignment)?;
            for date in range.days() {
                if !ctx.calendar.is_working_day(date) || !ctx.applies_on(date) {
                    continue;
                }
                let key = CompletionKey::new(assignment.id, date);
                let unresolved = completions
                    .get(&key)
                    .map_or(true, |c| c.status == CompletionStatus::NotDone);
                if unresolved && seen.insert(key) {
                    pending.push(PendingObligation {
                        assignment_id: assignment.id,
                        task_id: ctx.task.id,
                        task_name: ctx.task.name.clone(),
                        date,
                        status: DayStatus::Pending,
                    });
                }
            }
        }
        pending.sort_by_key(|p| (p.date, p.assignment_id));
        debug!(user_id, %today, count = pending.len(), "scanned pending obligations");
        Ok(pending)
    }

    /// First working day for `user_id` after `date`.
    pub fn next_working_day(&self, user_id: u64, date: NaiveDate) -> EngineResult<NaiveDate> {
        UserCalendar::load(self.store, user_id)?
            .next_working_day(date, self.settings.working_day_search_limit.min(MAX_ENGINE_DAYS))
    }

    fn completions_by_key(
        &self,
        assignment_ids: &[u64],
        range: DateRange,
    ) -> EngineResult<HashMap<CompletionKey, TaskCompletion>> {
        Ok(self
            .store
            .get_completion_range(assignment_ids, range)?
            .into_iter()
            .map(|c| (c.key(), c))
            .collect())
    }
}

/// First and last day of a month.
pub fn month_range(year: i32, month: u32) -> Option<DateRange> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some(DateRange::new(start, next.pred_opt()?))
}

/// Completion as the caller expresses it, before it is mapped to a status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompletionInput {
    /// Measured tasks: how much was done against the benchmark.
    Quantity { quantity: f64 },
    /// Unmeasured tasks: done or not.
    Binary { done: bool },
}

/// A validated-on-write completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub status: CompletionStatus,
    pub quantity: Option<f64>,
    pub notes: Option<String>,
}

impl CompletionRequest {
    pub fn new(status: CompletionStatus) -> Self {
        CompletionRequest { status, quantity: None, notes: None }
    }

    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Map a quantity or binary input onto a status for a task with the given
    /// benchmark.
    pub fn from_input(
        input: CompletionInput,
        benchmark: Option<f64>,
        notes: Option<String>,
    ) -> EngineResult<Self> {
        let (status, quantity) = match (input, benchmark) {
            // A measured task marked done counts as meeting its benchmark.
            (CompletionInput::Binary { done: true }, b) => (CompletionStatus::Completed, b),
            (CompletionInput::Binary { done: false }, b) => (CompletionStatus::NotDone, b.map(|_| 0.0)),
            (CompletionInput::Quantity { .. }, None) => {
                return Err(EngineError::Validation(
                    "quantity given for a task without a benchmark".into(),
                ))
            }
            (CompletionInput::Quantity { quantity }, Some(b)) => {
                let status = if quantity >= b {
                    CompletionStatus::Completed
                } else if quantity > 0.0 {
                    CompletionStatus::Partial
                } else {
                    CompletionStatus::NotDone
                };
                (status, Some(quantity))
            }
        };
        Ok(CompletionRequest { status, quantity, notes })
    }
}

fn validate_request(task: &Task, request: &CompletionRequest) -> EngineResult<()> {
    if let Some(q) = request.quantity {
        if !q.is_finite() || q < 0.0 {
            return Err(EngineError::Validation(format!("quantity must be zero or more, got {q}")));
        }
    }
    match (task.benchmark, request.quantity) {
        (Some(_), None) => {
            return Err(EngineError::Validation(format!(
                "quantity is required for '{}' (benchmark set)",
                task.name
            )))
        }
        (None, Some(_)) => {
            return Err(EngineError::Validation(format!(
                "'{}' has no benchmark; record it without a quantity",
                task.name
            )))
        }
        _ => {}
    }
    let needs_notes = matches!(request.status, CompletionStatus::Partial | CompletionStatus::NotDone);
    if needs_notes && request.notes.is_none() {
        return Err(EngineError::Validation(
            "notes are required for partial and not-done completions".into(),
        ));
    }
    Ok(())
}

/// Record the outcome for `(assignment_id, scheduled_date)` as of `today`.
///
/// The completion date is `today`, so a record written after its scheduled
/// date derives as `delayed`. Repeating a call with the same arguments leaves
/// the same single record. The dependency check and the upsert run under the
/// same exclusive borrow of the store.
pub fn set_completion<S: Store + ?Sized>(
    store: &mut S,
    assignment_id: u64,
    scheduled_date: NaiveDate,
    mut request: CompletionRequest,
    today: NaiveDate,
) -> EngineResult<TaskCompletion> {
    let assignment = store
        .assignment(assignment_id)?
        .ok_or_else(|| EngineError::NotFound(format!("assignment {assignment_id}")))?;
    let task = store
        .task(assignment.task_id)?
        .ok_or_else(|| EngineError::NotFound(format!("task {}", assignment.task_id)))?;

    request.notes = request
        .notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    validate_request(&task, &request)?;
    if today < scheduled_date {
        return Err(EngineError::Validation(format!(
            "cannot record {scheduled_date} before it is due (today is {today})"
        )));
    }
    if request.status.is_resolving() {
        ensure_dependencies_met(&*store, &task, assignment.assigned_to, scheduled_date)?;
    }

    let completion = store.upsert_completion(
        CompletionKey::new(assignment_id, scheduled_date),
        CompletionFields {
            completion_date: today,
            status: request.status,
            quantity_completed: request.quantity,
            notes: request.notes,
        },
    )?;
    info!(assignment_id, %scheduled_date, status = ?completion.status, "recorded completion");
    Ok(completion)
}

/// Manager review of a stored completion.
pub fn review_completion<S: Store + ?Sized>(
    store: &mut S,
    assignment_id: u64,
    scheduled_date: NaiveDate,
    approve: bool,
    comment: Option<String>,
) -> EngineResult<TaskCompletion> {
    let key = CompletionKey::new(assignment_id, scheduled_date);
    let mut completion = store.get_completion(key)?.ok_or_else(|| {
        EngineError::NotFound(format!("completion for assignment {assignment_id} on {scheduled_date}"))
    })?;
    completion.approval_status = if approve {
        ApprovalStatus::Approved
    } else {
        ApprovalStatus::Rejected
    };
    completion.manager_comment = comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
    store.put_completion(completion.clone())?;
    info!(assignment_id, %scheduled_date, approval = ?completion.approval_status, "reviewed completion");
    Ok(completion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use crate::aggregate::completion_percentage;
    use crate::db::Database;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn daily() -> RecurrenceConfig {
        RecurrenceConfig::Daily { interval: 1, end: RecurrenceEnd::Never }
    }

    /// One user, weekends off, one daily task anchored on `anchor`.
    fn fixture(anchor: NaiveDate, benchmark: Option<f64>) -> (Database, TaskAssignment) {
        let mut db = Database::with_weekly_off(BTreeSet::from([0, 6]));
        let user = db.add_user("Eve", None, None).unwrap();
        let task = db.add_task("Log deliveries", benchmark, anchor, daily(), 0).unwrap();
        let assignment = db.assign_task(task, user, user, 0).unwrap();
        (db, assignment)
    }

    fn engine(db: &Database) -> StatusEngine<'_, Database> {
        StatusEngine::new(db, EngineConfig::default())
    }

    #[test]
    fn test_derive_status_without_record() {
        let today = d(2025, 6, 11);
        let status = |day, applies, date| derive_status(None, day, applies, date, today);
        assert_eq!(status(WorkingDay::Off(OffReason::WeeklyOff), true, d(2025, 6, 10)), DayStatus::NotApplicable);
        assert_eq!(status(WorkingDay::Working, false, d(2025, 6, 10)), DayStatus::NotApplicable);
        assert_eq!(status(WorkingDay::Working, true, d(2025, 6, 10)), DayStatus::NotDone);
        assert_eq!(status(WorkingDay::Working, true, today), DayStatus::Scheduled);
        assert_eq!(status(WorkingDay::Working, true, d(2025, 6, 12)), DayStatus::Scheduled);
    }

    #[test]
    fn test_late_resolving_completion_is_delayed() {
        let mut c = TaskCompletion {
            assignment_id: 1,
            scheduled_date: d(2025, 6, 2),
            completion_date: d(2025, 6, 2),
            status: CompletionStatus::Completed,
            quantity_completed: None,
            notes: None,
            approval_status: ApprovalStatus::Pending,
            manager_comment: None,
        };
        let today = d(2025, 6, 20);
        let derive = |c: &TaskCompletion| derive_status(Some(c), WorkingDay::Working, true, c.scheduled_date, today);
        assert_eq!(derive(&c), DayStatus::Completed);

        c.completion_date = d(2025, 6, 3);
        assert_eq!(derive(&c), DayStatus::Delayed);
        c.status = CompletionStatus::Partial;
        assert_eq!(derive(&c), DayStatus::Delayed);
        c.status = CompletionStatus::NotDone;
        assert_eq!(derive(&c), DayStatus::NotDone);
    }

    #[test]
    fn test_delayed_scenario() {
        // Everyone works every day here, so 2025-06-01 (a Sunday) is a working day.
        let (mut db, a) = fixture(d(2025, 5, 1), None);
        db.calendar.org_weekly_off.clear();
        set_completion(
            &mut db,
            a.id,
            d(2025, 6, 1),
            CompletionRequest::new(CompletionStatus::Completed),
            d(2025, 6, 3),
        )
        .unwrap();

        let today = d(2025, 6, 3);
        let e = engine(&db);
        assert_eq!(e.daily_status(&a, d(2025, 6, 1), today).unwrap(), DayStatus::Delayed);
        assert_eq!(e.daily_status(&a, d(2025, 6, 3), today).unwrap(), DayStatus::Scheduled);
        assert_eq!(e.daily_status(&a, d(2025, 6, 2), today).unwrap(), DayStatus::NotDone);
    }

    #[test]
    fn test_completion_on_day_off_is_shown() {
        let (mut db, a) = fixture(d(2025, 6, 2), None);
        // Saturday, a weekly off for this user.
        let saturday = d(2025, 6, 7);
        db.calendar.org_weekly_off.clear();
        set_completion(&mut db, a.id, saturday, CompletionRequest::new(CompletionStatus::Completed), saturday)
            .unwrap();
        db.calendar.org_weekly_off = BTreeSet::from([0, 6]);

        let e = engine(&db);
        assert_eq!(e.daily_status(&a, saturday, d(2025, 6, 9)).unwrap(), DayStatus::Completed);
        assert_eq!(e.daily_status(&a, d(2025, 6, 8), d(2025, 6, 9)).unwrap(), DayStatus::NotApplicable);
    }

    #[test]
    fn test_malformed_recurrence_is_never_scheduled() {
        let (mut db, a) = fixture(d(2025, 6, 2), None);
        db.tasks[0].recurrence = RecurrenceConfig::Weekly {
            interval: 1,
            days_of_week: BTreeSet::from([8]),
            end: RecurrenceEnd::Never,
        };
        let e = engine(&db);
        assert_eq!(e.daily_status(&a, d(2025, 6, 4), d(2025, 6, 4)).unwrap(), DayStatus::NotApplicable);
        assert!(e.pending_obligations(a.assigned_to, d(2025, 6, 12)).unwrap().is_empty());
    }

    #[test]
    fn test_range_statuses_agree_with_daily_status() {
        let (mut db, a) = fixture(d(2025, 6, 2), None);
        set_completion(&mut db, a.id, d(2025, 6, 3), CompletionRequest::new(CompletionStatus::Completed), d(2025, 6, 3))
            .unwrap();
        set_completion(&mut db, a.id, d(2025, 6, 4), CompletionRequest::new(CompletionStatus::Completed), d(2025, 6, 6))
            .unwrap();
        let today = d(2025, 6, 10);
        let range = DateRange::new(d(2025, 6, 1), d(2025, 6, 14));
        let e = engine(&db);
        let entries = e.range_statuses(&a, range, today).unwrap();
        assert_eq!(entries.len(), 14);
        for entry in &entries {
            assert_eq!(entry.status, e.daily_status(&a, entry.date, today).unwrap(), "{}", entry.date);
        }
        assert_eq!(entries[2].status, DayStatus::Completed);
        assert_eq!(entries[3].status, DayStatus::Delayed);
    }

    #[test]
    fn test_pending_carry_forward_scenario() {
        // Anchored Monday 2025-06-09; today is Thursday 2025-06-12.
        let (db, a) = fixture(d(2025, 6, 9), None);
        let today = d(2025, 6, 12);
        let pending = engine(&db).pending_obligations(a.assigned_to, today).unwrap();
        let dates: Vec<_> = pending.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![d(2025, 6, 9), d(2025, 6, 10), d(2025, 6, 11)]);
        assert!(pending.iter().all(|p| p.status == DayStatus::Pending && p.assignment_id == a.id));
        assert_eq!(pending[0].task_name, "Log deliveries");
    }

    #[test]
    fn test_pending_excludes_resolved_but_keeps_not_done() {
        let (mut db, a) = fixture(d(2025, 6, 9), None);
        let today = d(2025, 6, 12);
        // Completed late for the 9th, explicitly not done for the 10th.
        set_completion(&mut db, a.id, d(2025, 6, 9), CompletionRequest::new(CompletionStatus::Completed), today)
            .unwrap();
        set_completion(
            &mut db,
            a.id,
            d(2025, 6, 10),
            CompletionRequest::new(CompletionStatus::NotDone).with_notes("van broke down"),
            d(2025, 6, 10),
        )
        .unwrap();

        let e = engine(&db);
        let dates: Vec<_> = e
            .pending_obligations(a.assigned_to, today)
            .unwrap()
            .iter()
            .map(|p| p.date)
            .collect();
        assert_eq!(dates, vec![d(2025, 6, 10), d(2025, 6, 11)]);
        assert_eq!(e.daily_status(&a, d(2025, 6, 9), today).unwrap(), DayStatus::Delayed);
    }

    #[test]
    fn test_pending_respects_lookback_and_working_days() {
        let (mut db, a) = fixture(d(2025, 1, 1), None);
        db.calendar.org_weekly_off.clear();
        db.add_holiday(d(2025, 6, 5), "Founders day");
        let today = d(2025, 6, 12);
        let pending = engine(&db).pending_obligations(a.assigned_to, today).unwrap();
        assert_eq!(pending.len(), 29);
        assert_eq!(pending[0].date, d(2025, 5, 13));
        assert!(pending.iter().all(|p| p.date != d(2025, 6, 5) && p.date < today));

        let short = StatusEngine::new(
            &db,
            EngineConfig { pending_lookback_days: 3, ..EngineConfig::default() },
        );
        assert_eq!(short.pending_obligations(a.assigned_to, today).unwrap().len(), 3);
    }

    #[test]
    fn test_pending_with_oversized_lookback_stays_bounded() {
        let (mut db, a) = fixture(d(2025, 1, 1), None);
        db.calendar.org_weekly_off.clear();
        db.add_holiday(d(2025, 6, 5), "Founders day");
        let wide = StatusEngine::new(
            &db,
            EngineConfig { pending_lookback_days: u32::MAX, ..EngineConfig::default() },
        );
        let pending = wide.pending_obligations(a.assigned_to, d(2025, 6, 12)).unwrap();
        // Every working day from the anchor through the 11th, less the holiday.
        assert_eq!(pending.len(), 161);
        assert_eq!(pending[0].date, d(2025, 1, 1));
        assert!(wide.pending_obligations(a.assigned_to, NaiveDate::MIN).unwrap().is_empty());
    }

    #[test]
    fn test_dependency_gating_scenario() {
        let mut db = Database::default();
        let user = db.add_user("Finn", None, None).unwrap();
        let task_a = db.add_task("Task A", None, d(2025, 6, 1), daily(), 0).unwrap();
        let task_b = db.add_task("Task B", None, d(2025, 6, 1), daily(), 0).unwrap();
        db.add_dependency(task_b, task_a).unwrap();
        let a = db.assign_task(task_a, user, user, 0).unwrap();
        let b = db.assign_task(task_b, user, user, 0).unwrap();
        let date = d(2025, 6, 10);
        let done = || CompletionRequest::new(CompletionStatus::Completed);

        match set_completion(&mut db, b.id, date, done(), date) {
            Err(EngineError::DependencyUnmet { blocking, .. }) => assert_eq!(blocking, vec!["Task A".to_string()]),
            other => panic!("expected dependency error, got {other:?}"),
        }
        assert!(db.completions.is_empty());

        set_completion(&mut db, a.id, date, done(), date).unwrap();
        let record = set_completion(&mut db, b.id, date, done(), date).unwrap();
        assert_eq!(record.status, CompletionStatus::Completed);
    }

    #[test]
    fn test_not_done_is_not_gated() {
        let mut db = Database::default();
        let user = db.add_user("Gus", None, None).unwrap();
        let first = db.add_task("First", None, d(2025, 6, 1), daily(), 0).unwrap();
        let second = db.add_task("Second", None, d(2025, 6, 1), daily(), 0).unwrap();
        db.add_dependency(second, first).unwrap();
        db.assign_task(first, user, user, 0).unwrap();
        let b = db.assign_task(second, user, user, 0).unwrap();
        let date = d(2025, 6, 10);
        let request = CompletionRequest::new(CompletionStatus::NotDone).with_notes("blocked upstream");
        assert!(set_completion(&mut db, b.id, date, request, date).is_ok());
    }

    #[test]
    fn test_set_completion_is_idempotent() {
        let (mut db, a) = fixture(d(2025, 6, 2), Some(10.0));
        let request = CompletionRequest::new(CompletionStatus::Partial)
            .with_quantity(4.0)
            .with_notes("  half a shift  ");
        let first = set_completion(&mut db, a.id, d(2025, 6, 3), request.clone(), d(2025, 6, 4)).unwrap();
        let second = set_completion(&mut db, a.id, d(2025, 6, 3), request, d(2025, 6, 4)).unwrap();
        assert_eq!(first, second);
        assert_eq!(db.completions.len(), 1);
        assert_eq!(first.notes.as_deref(), Some("half a shift"));
    }

    #[test]
    fn test_set_completion_validation() {
        let (mut db, a) = fixture(d(2025, 6, 2), Some(10.0));
        let date = d(2025, 6, 3);
        let cases = [
            CompletionRequest::new(CompletionStatus::Completed),
            CompletionRequest::new(CompletionStatus::Partial).with_quantity(3.0),
            CompletionRequest::new(CompletionStatus::Partial).with_quantity(3.0).with_notes("   "),
            CompletionRequest::new(CompletionStatus::Completed).with_quantity(-1.0),
        ];
        for request in cases {
            assert!(matches!(
                set_completion(&mut db, a.id, date, request, date),
                Err(EngineError::Validation(_))
            ));
        }
        let future = CompletionRequest::new(CompletionStatus::Completed).with_quantity(10.0);
        assert!(matches!(
            set_completion(&mut db, a.id, d(2025, 6, 5), future, date),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            set_completion(&mut db, 99, date, CompletionRequest::new(CompletionStatus::Completed), date),
            Err(EngineError::NotFound(_))
        ));
        assert!(db.completions.is_empty());
    }

    #[test]
    fn test_quantity_rejected_without_benchmark() {
        let (mut db, a) = fixture(d(2025, 6, 2), None);
        let date = d(2025, 6, 3);
        let request = CompletionRequest::new(CompletionStatus::Completed).with_quantity(3.0);
        assert!(matches!(
            set_completion(&mut db, a.id, date, request, date),
            Err(EngineError::Validation(_))
        ));
        assert!(db.completions.is_empty());
        let plain = CompletionRequest::new(CompletionStatus::Completed);
        assert!(set_completion(&mut db, a.id, date, plain, date).is_ok());
    }

    #[test]
    fn test_completion_input_resolution() {
        let q = |quantity| CompletionInput::Quantity { quantity };
        let status = |input, benchmark| {
            CompletionRequest::from_input(input, benchmark, None).map(|r| (r.status, r.quantity))
        };
        assert_eq!(status(q(12.0), Some(10.0)).unwrap(), (CompletionStatus::Completed, Some(12.0)));
        assert_eq!(status(q(4.0), Some(10.0)).unwrap(), (CompletionStatus::Partial, Some(4.0)));
        assert_eq!(status(q(0.0), Some(10.0)).unwrap(), (CompletionStatus::NotDone, Some(0.0)));
        assert!(status(q(1.0), None).is_err());
        assert_eq!(
            status(CompletionInput::Binary { done: true }, None).unwrap(),
            (CompletionStatus::Completed, None)
        );
        assert_eq!(
            status(CompletionInput::Binary { done: false }, Some(5.0)).unwrap(),
            (CompletionStatus::NotDone, Some(0.0))
        );
    }

    #[test]
    fn test_review_and_reset_on_rewrite() {
        let (mut db, a) = fixture(d(2025, 6, 2), None);
        let date = d(2025, 6, 3);
        assert!(matches!(
            review_completion(&mut db, a.id, date, true, None),
            Err(EngineError::NotFound(_))
        ));
        set_completion(&mut db, a.id, date, CompletionRequest::new(CompletionStatus::Completed), date).unwrap();
        let reviewed = review_completion(&mut db, a.id, date, false, Some("photo missing".into())).unwrap();
        assert_eq!(reviewed.approval_status, ApprovalStatus::Rejected);
        assert_eq!(reviewed.manager_comment.as_deref(), Some("photo missing"));

        let rewritten =
            set_completion(&mut db, a.id, date, CompletionRequest::new(CompletionStatus::Completed), date).unwrap();
        assert_eq!(rewritten.approval_status, ApprovalStatus::Pending);
        assert_eq!(rewritten.manager_comment, None);
    }

    #[test]
    fn test_month_view_and_percentage() {
        let (mut db, a) = fixture(d(2025, 6, 2), Some(10.0));
        let partial = CompletionRequest::new(CompletionStatus::Partial).with_quantity(5.0).with_notes("rain");
        set_completion(&mut db, a.id, d(2025, 6, 2), partial, d(2025, 6, 2)).unwrap();
        let full = CompletionRequest::new(CompletionStatus::Completed).with_quantity(10.0);
        set_completion(&mut db, a.id, d(2025, 6, 3), full.clone(), d(2025, 6, 3)).unwrap();
        set_completion(&mut db, a.id, d(2025, 6, 4), full, d(2025, 6, 5)).unwrap();
        review_completion(&mut db, a.id, d(2025, 6, 3), true, None).unwrap();

        let e = engine(&db);
        // Today is Thursday the 5th: the 5th and 6th are still scheduled.
        let view = e.month_view(&a, 2025, 6, d(2025, 6, 5)).unwrap();
        assert_eq!(view.len(), 30);
        assert_eq!(view[0].status, DayStatus::NotApplicable);
        assert_eq!(view[0].off_reason, Some(OffReason::WeeklyOff));
        assert_eq!(view[1].status, DayStatus::Partial);
        assert_eq!(view[1].notes.as_deref(), Some("rain"));
        assert_eq!(view[2].approval_status, Some(ApprovalStatus::Approved));
        assert_eq!(view[3].status, DayStatus::Delayed);
        assert_eq!(view[4].status, DayStatus::Scheduled);

        let benchmark = e.benchmark(&a).unwrap();
        let first_week: Vec<_> = view[..7].iter().map(|day| day.score(benchmark)).collect();
        // Scheduled days: 2,3,4,5,6 -> (0.5 + 1 + 0.5 + 0 + 0) / 5 = 40%.
        assert_eq!(completion_percentage(&first_week), 40);
        assert!(e.month_view(&a, 2025, 13, d(2025, 6, 5)).is_err());
    }

    #[test]
    fn test_next_working_day_through_engine() {
        let (mut db, a) = fixture(d(2025, 6, 2), None);
        db.add_leave(a.assigned_to, d(2025, 6, 9), d(2025, 6, 10), true).unwrap();
        let e = engine(&db);
        assert_eq!(e.next_working_day(a.assigned_to, d(2025, 6, 6)).unwrap(), d(2025, 6, 11));
    }

    #[test]
    fn test_month_range() {
        assert_eq!(month_range(2024, 2), Some(DateRange::new(d(2024, 2, 1), d(2024, 2, 29))));
        assert_eq!(month_range(2025, 12), Some(DateRange::new(d(2025, 12, 1), d(2025, 12, 31))));
        assert_eq!(month_range(2025, 0), None);
    }
}
