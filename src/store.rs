//! Interfaces the engine consumes from the record store.
//!
//! The engine only reads through these traits, except for
//! [`CompletionStore::upsert`]. Implementations own durability and any retry
//! policy; their failures surface as [`StoreError`] and propagate unchanged.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::error::StoreError;
use crate::task::*;

pub trait CompletionStore {
    fn get_completion(&self, key: CompletionKey) -> Result<Option<TaskCompletion>, StoreError>;

    /// All completions for `assignment_ids` whose scheduled date falls in `range`.
    fn get_completion_range(
        &self,
        assignment_ids: &[u64],
        range: DateRange,
    ) -> Result<Vec<TaskCompletion>, StoreError>;

    /// Insert or replace the record for `key`. At most one record exists per key.
    fn upsert_completion(
        &mut self,
        key: CompletionKey,
        fields: CompletionFields,
    ) -> Result<TaskCompletion, StoreError>;

    /// Replace a stored record as-is (used for review fields).
    fn put_completion(&mut self, completion: TaskCompletion) -> Result<(), StoreError>;
}

pub trait OrgCalendarStore {
    fn user_weekly_off_override(&self, user_id: u64) -> Result<Option<BTreeSet<u8>>, StoreError>;
    fn org_weekly_off(&self) -> Result<BTreeSet<u8>, StoreError>;
    fn public_holidays(&self) -> Result<BTreeSet<NaiveDate>, StoreError>;
    /// Approved personal leave only.
    fn approved_leave(&self, user_id: u64) -> Result<Vec<LeaveInterval>, StoreError>;
}

pub trait TaskGraphStore {
    fn task(&self, task_id: u64) -> Result<Option<Task>, StoreError>;
    fn dependencies(&self, task_id: u64) -> Result<Vec<u64>, StoreError>;
    fn assignment(&self, assignment_id: u64) -> Result<Option<TaskAssignment>, StoreError>;
    /// The assignment of `task_id` to `user_id`, if any.
    fn assignment_for(&self, user_id: u64, task_id: u64) -> Result<Option<TaskAssignment>, StoreError>;
    fn assignments_for_user(&self, user_id: u64) -> Result<Vec<TaskAssignment>, StoreError>;
}

/// Everything the status engine needs from one backing store.
pub trait Store: CompletionStore + OrgCalendarStore + TaskGraphStore {}

impl<T: CompletionStore + OrgCalendarStore + TaskGraphStore> Store for T {}
