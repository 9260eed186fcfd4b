//! Dependency gating for completion writes.
//!
//! Only direct dependencies are checked. A dependency counts when the same user
//! holds an assignment for it; its completion for the same scheduled date must
//! be `completed` or `partial`. Dependencies the user is not assigned to never
//! block.

use chrono::NaiveDate;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::store::{CompletionStore, TaskGraphStore};
use crate::task::{CompletionKey, Task};

/// Names of the direct dependencies of `task` that `user_id` has not yet
/// resolved for `scheduled_date`.
pub fn unmet_dependencies<S>(
    store: &S,
    task: &Task,
    user_id: u64,
    scheduled_date: NaiveDate,
) -> EngineResult<Vec<String>>
where
    S: CompletionStore + TaskGraphStore + ?Sized,
{
    let mut blocking = Vec::new();
    for dep_id in store.dependencies(task.id)? {
        let Some(dep_assignment) = store.assignment_for(user_id, dep_id)? else {
            continue;
        };
        let resolved = store
            .get_completion(CompletionKey::new(dep_assignment.id, scheduled_date))?
            .map(|c| c.status.is_resolving())
            .unwrap_or(false);
        if !resolved {
            let name = store
                .task(dep_id)?
                .map(|t| t.name)
                .unwrap_or_else(|| format!("task {dep_id}"));
            blocking.push(name);
        }
    }
    debug!(task_id = task.id, %scheduled_date, blocking = blocking.len(), "checked dependencies");
    Ok(blocking)
}

/// Fail with [`EngineError::DependencyUnmet`] unless every direct dependency is met.
pub fn ensure_dependencies_met<S>(
    store: &S,
    task: &Task,
    user_id: u64,
    scheduled_date: NaiveDate,
) -> EngineResult<()>
where
    S: CompletionStore + TaskGraphStore + ?Sized,
{
    let blocking = unmet_dependencies(store, task, user_id, scheduled_date)?;
    if blocking.is_empty() {
        Ok(())
    } else {
        Err(EngineError::DependencyUnmet { task: task.name.clone(), blocking })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::fields::CompletionStatus;
    use crate::store::CompletionStore;
    use crate::task::{CompletionFields, RecurrenceConfig, RecurrenceEnd};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn setup() -> (Database, u64, u64, u64) {
        let mut db = Database::default();
        let user = db.add_user("Dana", None, None).unwrap();
        let daily = RecurrenceConfig::Daily { interval: 1, end: RecurrenceEnd::Never };
        let a = db.add_task("Count cash", None, d(2025, 6, 1), daily.clone(), 0).unwrap();
        let b = db.add_task("Close till", None, d(2025, 6, 1), daily, 0).unwrap();
        db.add_dependency(b, a).unwrap();
        (db, user, a, b)
    }

    fn record(db: &mut Database, assignment: u64, date: NaiveDate, status: CompletionStatus) {
        db.upsert_completion(
            CompletionKey::new(assignment, date),
            CompletionFields {
                completion_date: date,
                status,
                quantity_completed: None,
                notes: Some("note".into()),
            },
        )
        .unwrap();
    }

    #[test]
    fn test_unassigned_dependency_does_not_block() {
        let (mut db, user, _a, b) = setup();
        db.assign_task(b, user, user, 0).unwrap();
        let task = db.get_task(b).unwrap().clone();
        assert!(ensure_dependencies_met(&db, &task, user, d(2025, 6, 10)).is_ok());
    }

    #[test]
    fn test_dependency_needs_resolving_status_on_same_date() {
        let (mut db, user, a, b) = setup();
        let dep = db.assign_task(a, user, user, 0).unwrap();
        db.assign_task(b, user, user, 0).unwrap();
        let task = db.get_task(b).unwrap().clone();
        let date = d(2025, 6, 10);

        match ensure_dependencies_met(&db, &task, user, date) {
            Err(EngineError::DependencyUnmet { blocking, .. }) => {
                assert_eq!(blocking, vec!["Count cash".to_string()])
            }
            other => panic!("expected unmet dependency, got {other:?}"),
        }

        record(&mut db, dep.id, d(2025, 6, 9), CompletionStatus::Completed);
        assert!(ensure_dependencies_met(&db, &task, user, date).is_err());

        record(&mut db, dep.id, date, CompletionStatus::NotDone);
        assert!(ensure_dependencies_met(&db, &task, user, date).is_err());

        record(&mut db, dep.id, date, CompletionStatus::Partial);
        assert!(ensure_dependencies_met(&db, &task, user, date).is_ok());
    }
}
