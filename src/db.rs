//! Database operations and utility functions for recurring task tracking.
//!
//! This module provides the JSON-file-backed `Database`, which implements the
//! record store traits the engine consumes, along with write-time validation
//! (dependency acyclicity, delegation classification) and the date parsing and
//! formatting helpers used by the CLI.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult, StoreError};
use crate::fields::*;
use crate::recurrence::RecurrenceRule;
use crate::store::*;
use crate::task::*;

/// Organisation-wide calendar data.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct OrgCalendar {
    #[serde(default)]
    pub org_weekly_off: BTreeSet<u8>,
    /// Holiday date to its display name.
    #[serde(default)]
    pub public_holidays: BTreeMap<NaiveDate, String>,
    #[serde(default)]
    pub leave: Vec<LeaveInterval>,
}

/// In-memory database for users, tasks, assignments and completions.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub assignments: Vec<TaskAssignment>,
    #[serde(default)]
    pub completions: Vec<TaskCompletion>,
    #[serde(default)]
    pub dependencies: Vec<TaskDependency>,
    #[serde(default)]
    pub calendar: OrgCalendar,
}

impl Database {
    /// Empty database with an org-wide weekly-off set.
    pub fn with_weekly_off(days: BTreeSet<u8>) -> Self {
        let mut db = Database::default();
        db.calendar.org_weekly_off = days;
        db
    }

    /// Load database from JSON file. A missing file yields `None`.
    pub fn load(path: &Path) -> Result<Option<Self>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let mut buf = String::new();
        File::open(path)?.read_to_string(&mut buf)?;
        let db: Database = serde_json::from_str(&buf)?;
        debug!(path = %path.display(), tasks = db.tasks.len(), "loaded database");
        Ok(Some(db))
    }

    /// Save database to JSON file using atomic write (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(self)?;
        let mut f = File::create(&tmp)?;
        f.write_all(data.as_bytes())?;
        f.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    fn next_user_id(&self) -> u64 {
        self.users.iter().map(|u| u.id).max().unwrap_or(0) + 1
    }

    fn next_task_id(&self) -> u64 {
        self.tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }

    fn next_assignment_id(&self) -> u64 {
        self.assignments.iter().map(|a| a.id).max().unwrap_or(0) + 1
    }

    fn next_leave_id(&self) -> u64 {
        self.calendar.leave.iter().map(|l| l.id).max().unwrap_or(0) + 1
    }

    pub fn user(&self, id: u64) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn user_mut(&mut self, id: u64) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == id)
    }

    pub fn get_task(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn get_assignment(&self, id: u64) -> Option<&TaskAssignment> {
        self.assignments.iter().find(|a| a.id == id)
    }

    /// Task names keyed by ID, for display.
    pub fn task_names(&self) -> HashMap<u64, &str> {
        self.tasks.iter().map(|t| (t.id, t.name.as_str())).collect()
    }

    pub fn add_user(
        &mut self,
        name: &str,
        manager: Option<u64>,
        weekly_off: Option<BTreeSet<u8>>,
    ) -> EngineResult<u64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation("user name cannot be empty".into()));
        }
        if let Some(m) = manager {
            if self.user(m).is_none() {
                return Err(EngineError::NotFound(format!("manager {m}")));
            }
        }
        let id = self.next_user_id();
        self.users.push(User { id, name: name.to_string(), manager, weekly_off });
        info!(user_id = id, "added user");
        Ok(id)
    }

    /// Add a task. The recurrence is validated here so that malformed
    /// definitions only ever come from hand-edited or imported data.
    pub fn add_task(
        &mut self,
        name: &str,
        benchmark: Option<f64>,
        anchor_date: NaiveDate,
        recurrence: RecurrenceConfig,
        now_utc: i64,
    ) -> EngineResult<u64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation("task name cannot be empty".into()));
        }
        if let Some(b) = benchmark {
            if !(b.is_finite() && b > 0.0) {
                return Err(EngineError::Validation(format!("benchmark must be positive, got {b}")));
            }
        }
        let task = Task {
            id: self.next_task_id(),
            name: name.to_string(),
            benchmark,
            anchor_date,
            recurrence,
            created_at_utc: now_utc,
        };
        RecurrenceRule::compile(&task)?;
        let id = task.id;
        self.tasks.push(task);
        info!(task_id = id, "added task");
        Ok(id)
    }

    /// Assign a task. The delegation type is fixed here, from the hierarchy as
    /// it stands now.
    pub fn assign_task(
        &mut self,
        task_id: u64,
        assigned_to: u64,
        assigned_by: u64,
        now_utc: i64,
    ) -> EngineResult<TaskAssignment> {
        if self.get_task(task_id).is_none() {
            return Err(EngineError::NotFound(format!("task {task_id}")));
        }
        for user in [assigned_to, assigned_by] {
            if self.user(user).is_none() {
                return Err(EngineError::NotFound(format!("user {user}")));
            }
        }
        if self
            .assignments
            .iter()
            .any(|a| a.task_id == task_id && a.assigned_to == assigned_to)
        {
            return Err(EngineError::Validation(format!(
                "task {task_id} is already assigned to user {assigned_to}"
            )));
        }
        let assignment = TaskAssignment {
            id: self.next_assignment_id(),
            task_id,
            assigned_to,
            assigned_by,
            delegation: self.delegation_type(assigned_to, assigned_by),
            created_at_utc: now_utc,
        };
        self.assignments.push(assignment.clone());
        info!(assignment_id = assignment.id, delegation = ?assignment.delegation, "assigned task");
        Ok(assignment)
    }

    /// Managers of `user_id`, nearest first.
    pub fn manager_chain(&self, user_id: u64) -> Vec<u64> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([user_id]);
        let mut current = self.user(user_id).and_then(|u| u.manager);
        while let Some(m) = current {
            if !seen.insert(m) {
                break;
            }
            chain.push(m);
            current = self.user(m).and_then(|u| u.manager);
        }
        chain
    }

    pub fn delegation_type(&self, assigned_to: u64, assigned_by: u64) -> DelegationType {
        if assigned_to == assigned_by {
            DelegationType::SelfAssigned
        } else if self.manager_chain(assigned_to).contains(&assigned_by) {
            DelegationType::Downward
        } else if self.manager_chain(assigned_by).contains(&assigned_to) {
            DelegationType::Upward
        } else {
            DelegationType::Peer
        }
    }

    /// Record that `task_id` depends on `depends_on`, keeping the graph acyclic.
    pub fn add_dependency(&mut self, task_id: u64, depends_on: u64) -> EngineResult<()> {
        for id in [task_id, depends_on] {
            if self.get_task(id).is_none() {
                return Err(EngineError::NotFound(format!("task {id}")));
            }
        }
        if task_id == depends_on {
            return Err(EngineError::DependencyCycle(vec![task_id, task_id]));
        }
        let edge = TaskDependency { task_id, depends_on };
        if self.dependencies.contains(&edge) {
            return Ok(());
        }
        if let Some(path) = self.dependency_path(depends_on, task_id) {
            let mut cycle = vec![task_id];
            cycle.extend(path);
            return Err(EngineError::DependencyCycle(cycle));
        }
        self.dependencies.push(edge);
        Ok(())
    }

    /// Path of dependency edges from `from` to `to`, both ends included.
    fn dependency_path(&self, from: u64, to: u64) -> Option<Vec<u64>> {
        let mut edges: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
        for dep in &self.dependencies {
            edges.entry(dep.task_id).or_default().push(dep.depends_on);
        }
        let mut visited = HashSet::new();
        let mut stack = vec![vec![from]];
        while let Some(path) = stack.pop() {
            let Some(&node) = path.last() else { continue };
            if node == to {
                return Some(path);
            }
            if !visited.insert(node) {
                continue;
            }
            for &next in edges.get(&node).into_iter().flatten() {
                let mut extended = path.clone();
                extended.push(next);
                stack.push(extended);
            }
        }
        None
    }

    pub fn add_holiday(&mut self, date: NaiveDate, name: &str) {
        self.calendar.public_holidays.insert(date, name.trim().to_string());
    }

    pub fn add_leave(
        &mut self,
        user_id: u64,
        start: NaiveDate,
        end: NaiveDate,
        approved: bool,
    ) -> EngineResult<u64> {
        if self.user(user_id).is_none() {
            return Err(EngineError::NotFound(format!("user {user_id}")));
        }
        if end < start {
            return Err(EngineError::Validation(format!("leave ends ({end}) before it starts ({start})")));
        }
        let id = self.next_leave_id();
        self.calendar.leave.push(LeaveInterval { id, user_id, start, end, approved });
        Ok(id)
    }

    pub fn approve_leave(&mut self, leave_id: u64) -> EngineResult<()> {
        let leave = self
            .calendar
            .leave
            .iter_mut()
            .find(|l| l.id == leave_id)
            .ok_or_else(|| EngineError::NotFound(format!("leave {leave_id}")))?;
        leave.approved = true;
        Ok(())
    }

    /// Set or clear a user's weekly-off override.
    pub fn set_user_weekly_off(&mut self, user_id: u64, days: Option<BTreeSet<u8>>) -> EngineResult<()> {
        let user = self
            .user_mut(user_id)
            .ok_or_else(|| EngineError::NotFound(format!("user {user_id}")))?;
        user.weekly_off = days;
        Ok(())
    }
}

impl CompletionStore for Database {
    fn get_completion(&self, key: CompletionKey) -> Result<Option<TaskCompletion>, StoreError> {
        Ok(self.completions.iter().find(|c| c.key() == key).cloned())
    }

    fn get_completion_range(
        &self,
        assignment_ids: &[u64],
        range: DateRange,
    ) -> Result<Vec<TaskCompletion>, StoreError> {
        Ok(self
            .completions
            .iter()
            .filter(|c| assignment_ids.contains(&c.assignment_id) && range.contains(c.scheduled_date))
            .cloned()
            .collect())
    }

    fn upsert_completion(
        &mut self,
        key: CompletionKey,
        fields: CompletionFields,
    ) -> Result<TaskCompletion, StoreError> {
        let record = TaskCompletion {
            assignment_id: key.assignment_id,
            scheduled_date: key.scheduled_date,
            completion_date: fields.completion_date,
            status: fields.status,
            quantity_completed: fields.quantity_completed,
            notes: fields.notes,
            approval_status: ApprovalStatus::Pending,
            manager_comment: None,
        };
        match self.completions.iter_mut().find(|c| c.key() == key) {
            Some(existing) => *existing = record.clone(),
            None => self.completions.push(record.clone()),
        }
        Ok(record)
    }

    fn put_completion(&mut self, completion: TaskCompletion) -> Result<(), StoreError> {
        let key = completion.key();
        match self.completions.iter_mut().find(|c| c.key() == key) {
            Some(existing) => *existing = completion,
            None => self.completions.push(completion),
        }
        Ok(())
    }
}

impl OrgCalendarStore for Database {
    fn user_weekly_off_override(&self, user_id: u64) -> Result<Option<BTreeSet<u8>>, StoreError> {
        Ok(self.user(user_id).and_then(|u| u.weekly_off.clone()))
    }

    fn org_weekly_off(&self) -> Result<BTreeSet<u8>, StoreError> {
        Ok(self.calendar.org_weekly_off.clone())
    }

    fn public_holidays(&self) -> Result<BTreeSet<NaiveDate>, StoreError> {
        Ok(self.calendar.public_holidays.keys().copied().collect())
    }

    fn approved_leave(&self, user_id: u64) -> Result<Vec<LeaveInterval>, StoreError> {
        Ok(self
            .calendar
            .leave
            .iter()
            .filter(|l| l.user_id == user_id && l.approved)
            .cloned()
            .collect())
    }
}

impl TaskGraphStore for Database {
    fn task(&self, task_id: u64) -> Result<Option<Task>, StoreError> {
        Ok(self.get_task(task_id).cloned())
    }

    fn dependencies(&self, task_id: u64) -> Result<Vec<u64>, StoreError> {
        Ok(self
            .dependencies
            .iter()
            .filter(|d| d.task_id == task_id)
            .map(|d| d.depends_on)
            .collect())
    }

    fn assignment(&self, assignment_id: u64) -> Result<Option<TaskAssignment>, StoreError> {
        Ok(self.get_assignment(assignment_id).cloned())
    }

    fn assignment_for(&self, user_id: u64, task_id: u64) -> Result<Option<TaskAssignment>, StoreError> {
        Ok(self
            .assignments
            .iter()
            .find(|a| a.assigned_to == user_id && a.task_id == task_id)
            .cloned())
    }

    fn assignments_for_user(&self, user_id: u64) -> Result<Vec<TaskAssignment>, StoreError> {
        Ok(self
            .assignments
            .iter()
            .filter(|a| a.assigned_to == user_id)
            .cloned()
            .collect())
    }
}

/// Parse human-readable date input relative to `today`.
///
/// Supports:
/// - "today", "tomorrow", "yesterday"
/// - weekday names ("fri", "next monday", "last tuesday")
/// - "in 3d", "in 2w", "3d ago"
/// - "YYYY-MM-DD" format
pub fn parse_date_input(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    let s = s.trim().to_lowercase();

    match s.as_str() {
        "today" => return Some(today),
        "tomorrow" => return today.succ_opt(),
        "yesterday" => return today.pred_opt(),
        _ => {}
    }

    if let Some(rest) = s.strip_prefix("in ") {
        return parse_offset(rest).and_then(|days| shift_days(today, days));
    }
    if let Some(rest) = s.strip_suffix(" ago") {
        return parse_offset(rest).and_then(|days| shift_days(today, days.checked_neg()?));
    }

    let weekdays = [
        ("monday", 0), ("tuesday", 1), ("wednesday", 2), ("thursday", 3),
        ("friday", 4), ("saturday", 5), ("sunday", 6),
        ("mon", 0), ("tue", 1), ("wed", 2), ("thu", 3),
        ("fri", 4), ("sat", 5), ("sun", 6),
    ];

    let current_day = today.weekday().num_days_from_monday() as i64;
    for (day_name, target_day) in weekdays {
        let ahead = (target_day + 7 - current_day) % 7;
        if s == day_name || s == format!("this {day_name}") {
            return shift_days(today, ahead);
        }
        if s == format!("next {day_name}") {
            let days_to_add = if ahead == 0 { 7 } else { ahead + 7 };
            return shift_days(today, days_to_add);
        }
        if s == format!("last {day_name}") {
            let behind = (current_day + 7 - target_day) % 7;
            let days_back = if behind == 0 { 7 } else { behind };
            return shift_days(today, -days_back);
        }
    }

    NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()
}

/// `date` moved by `days`, or `None` when that leaves the representable range.
fn shift_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    date.checked_add_signed(Duration::try_days(days)?)
}

fn parse_offset(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Some(n) = s.strip_suffix('d') {
        return n.trim().parse::<i64>().ok();
    }
    if let Some(n) = s.strip_suffix('w') {
        return n.trim().parse::<i64>().ok()?.checked_mul(7);
    }
    None
}

/// Parse a "YYYY-MM" month, defaulting to the month containing `today`.
pub fn parse_month_input(s: Option<&str>, today: NaiveDate) -> Option<(i32, u32)> {
    match s {
        None => Some((today.year(), today.month())),
        Some(s) => {
            let first = NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d").ok()?;
            Some((first.year(), first.month()))
        }
    }
}

/// Format a date relative to today ("today", "tomorrow", "in 3d", "2d ago").
pub fn format_relative(date: NaiveDate, today: NaiveDate) -> String {
    let delta = (date - today).num_days();
    match delta {
        0 => "today".into(),
        1 => "tomorrow".into(),
        -1 => "yesterday".into(),
        n if n > 1 => format!("in {n}d"),
        n => format!("{}d ago", -n),
    }
}

/// Truncate a string to a maximum width, adding ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out = String::new();
        for (i, ch) in s.chars().enumerate() {
            if i + 1 >= width {
                out.push('…');
                break;
            }
            out.push(ch);
        }
        out
    }
}

/// Resolve a task identifier (either ID or name) to a task ID.
/// Returns an error if the name has multiple matches and suggests using ID instead.
pub fn resolve_task_identifier(identifier: &str, db: &Database) -> Result<u64, String> {
    if let Ok(id) = identifier.parse::<u64>() {
        return match db.get_task(id) {
            Some(_) => Ok(id),
            None => Err(format!("Task with ID {id} not found")),
        };
    }

    let matches: Vec<&Task> = db
        .tasks
        .iter()
        .filter(|t| t.name.eq_ignore_ascii_case(identifier))
        .collect();

    match matches.len() {
        0 => Err(format!("No task found with name '{identifier}'")),
        1 => Ok(matches[0].id),
        _ => {
            let mut error_msg = format!("Multiple tasks found with name '{identifier}':\n");
            for task in matches {
                error_msg.push_str(&format!("  ID {}: {} ({})\n", task.id, task.name, task.recurrence.describe()));
            }
            error_msg.push_str("Please use the specific ID instead.");
            Err(error_msg)
        }
    }
}

/// Resolve a user identifier (either ID or name) to a user ID.
pub fn resolve_user_identifier(identifier: &str, db: &Database) -> Result<u64, String> {
    if let Ok(id) = identifier.parse::<u64>() {
        return match db.user(id) {
            Some(_) => Ok(id),
            None => Err(format!("User with ID {id} not found")),
        };
    }
    let matches: Vec<&User> = db
        .users
        .iter()
        .filter(|u| u.name.eq_ignore_ascii_case(identifier))
        .collect();
    match matches.as_slice() {
        [] => Err(format!("No user found with name '{identifier}'")),
        [user] => Ok(user.id),
        _ => Err(format!("Multiple users named '{identifier}'; use the ID instead.")),
    }
}
