//! Command implementations for the CLI interface.
//!
//! Each handler works on a loaded `Database`, calls into the engine with an
//! explicit `today`, prints its result to stdout and saves the database when
//! it changed something. Errors are returned to `main`, which reports them.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use clap_complete::{generate, Shell};

use crate::aggregate::{summarize, DayScore};
use crate::calendar::WorkingDay;
use crate::config::EngineConfig;
use crate::db::*;
use crate::error::{EngineError, EngineResult};
use crate::fields::*;
use crate::status::*;
use crate::task::{RecurrenceConfig, RecurrenceEnd};

#[derive(Subcommand)]
pub enum Commands {
    /// Manage users.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Manage recurring tasks.
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Assign a task to a user.
    Assign {
        /// Task ID or name.
        task: String,
        /// Assignee ID or name.
        #[arg(long)]
        to: String,
        /// Assigner ID or name (defaults to the assignee).
        #[arg(long)]
        by: Option<String>,
    },

    /// Make a task depend on another task.
    Depend {
        /// Task ID or name that is gated.
        task: String,
        /// Task ID or name that must be done first.
        #[arg(long)]
        on: String,
    },

    /// Declare an org-wide public holiday.
    Holiday {
        /// Date of the holiday.
        date: String,
        /// Display name.
        #[arg(default_value = "Public Holiday")]
        name: String,
    },

    /// Manage personal leave.
    Leave {
        #[command(subcommand)]
        action: LeaveAction,
    },

    /// Set weekly offs for a user (override) or for the whole org.
    WeeklyOff {
        /// User ID or name. Omit with --org.
        user: Option<String>,
        /// Change the org-wide default instead of a user override.
        #[arg(long)]
        org: bool,
        /// Days off: numbers (0 = Sunday) or names, comma-separated. May be repeated.
        #[arg(long = "days", required_unless_present = "clear")]
        days: Vec<String>,
        /// Remove the user's override so the org default applies.
        #[arg(long, conflicts_with_all = ["org", "days"])]
        clear: bool,
    },

    /// Show the status of an assignment on one date.
    Status {
        /// Assignment ID.
        assignment: u64,
        /// Date to evaluate (default: today).
        #[arg(long)]
        date: Option<String>,
    },

    /// Show a month of statuses with completion details and percentage.
    Month {
        /// Assignment ID.
        assignment: u64,
        /// Month as YYYY-MM (default: current month).
        #[arg(long)]
        month: Option<String>,
    },

    /// List unresolved past obligations for a user.
    Pending {
        /// User ID or name.
        user: String,
    },

    /// Record the outcome of an obligation.
    Complete {
        /// Assignment ID.
        assignment: u64,
        /// Scheduled date being answered for (default: today).
        #[arg(long)]
        date: Option<String>,
        /// Explicit status: completed | partial | not-done.
        #[arg(long, value_enum, conflicts_with_all = ["not_done"])]
        status: Option<CompletionStatus>,
        /// Quantity achieved (required for tasks with a benchmark).
        #[arg(long)]
        quantity: Option<f64>,
        /// Mark as not done.
        #[arg(long)]
        not_done: bool,
        /// Notes (required for partial and not-done).
        #[arg(long)]
        notes: Option<String>,
    },

    /// Approve or reject a recorded completion.
    Review {
        /// Assignment ID.
        assignment: u64,
        /// Scheduled date of the completion.
        #[arg(long)]
        date: String,
        /// Reject instead of approve.
        #[arg(long)]
        reject: bool,
        /// Manager comment.
        #[arg(long)]
        comment: Option<String>,
    },

    /// Show the next working day for a user.
    NextWorkingDay {
        /// User ID or name.
        user: String,
        /// Start date (default: today).
        #[arg(long)]
        date: Option<String>,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum UserAction {
    /// Add a user.
    Add {
        name: String,
        /// Manager ID or name.
        #[arg(long)]
        manager: Option<String>,
    },
    /// List users.
    List,
}

#[derive(Subcommand)]
pub enum TaskAction {
    /// Add a task.
    Add {
        /// Task name.
        name: String,
        /// Target quantity per occurrence.
        #[arg(long)]
        benchmark: Option<f64>,
        /// Anchor date occurrences are counted from (default: today).
        #[arg(long)]
        anchor: Option<String>,
        /// Frequency: none | daily | weekly | monthly | yearly | custom.
        #[arg(long, value_enum, default_value_t = RecurrenceKind::None)]
        repeat: RecurrenceKind,
        /// Repeat every N periods.
        #[arg(long, default_value_t = 1)]
        interval: u32,
        /// Weekly: days (0 = Sunday or names), comma-separated.
        #[arg(long = "days")]
        days: Vec<String>,
        /// Monthly: fixed day of month.
        #[arg(long)]
        day_of_month: Option<u8>,
        /// Monthly: 1, 2, 3, 4, -1 (last) or -2 (second to last).
        #[arg(long, allow_hyphen_values = true)]
        ordinal: Option<i8>,
        /// Monthly: weekday used with --ordinal.
        #[arg(long)]
        weekday: Option<String>,
        /// Last possible occurrence date (inclusive).
        #[arg(long, conflicts_with = "count")]
        until: Option<String>,
        /// Stop after this many occurrences.
        #[arg(long)]
        count: Option<u32>,
    },
    /// List tasks.
    List,
}

#[derive(Subcommand)]
pub enum LeaveAction {
    /// Record a leave interval (inclusive).
    Add {
        /// User ID or name.
        user: String,
        start: String,
        end: String,
        /// Record as already approved.
        #[arg(long)]
        approved: bool,
    },
    /// Approve a leave interval.
    Approve { id: u64 },
}

fn parse_date_arg(s: &str, today: NaiveDate) -> EngineResult<NaiveDate> {
    parse_date_input(s, today)
        .ok_or_else(|| EngineError::Validation(format!("unrecognised date '{s}'")))
}

fn date_or_today(s: Option<&str>, today: NaiveDate) -> EngineResult<NaiveDate> {
    s.map_or(Ok(today), |s| parse_date_arg(s, today))
}

fn user_id(identifier: &str, db: &Database) -> EngineResult<u64> {
    resolve_user_identifier(identifier, db).map_err(EngineError::Lookup)
}

fn task_id(identifier: &str, db: &Database) -> EngineResult<u64> {
    resolve_task_identifier(identifier, db).map_err(EngineError::Lookup)
}

fn weekday_set(inputs: &[String]) -> EngineResult<BTreeSet<u8>> {
    parse_weekdays(inputs).map_err(EngineError::Validation)
}

pub fn cmd_user(db: &mut Database, db_path: &Path, action: UserAction) -> EngineResult<()> {
    match action {
        UserAction::Add { name, manager } => {
            let manager = manager.as_deref().map(|m| user_id(m, db)).transpose()?;
            let id = db.add_user(&name, manager, None)?;
            db.save(db_path)?;
            println!("Added user {id}");
        }
        UserAction::List => {
            println!("{:<5} {:<20} {:<20} {}", "ID", "Name", "Manager", "Weekly off");
            for u in &db.users {
                let manager = u
                    .manager
                    .and_then(|m| db.user(m))
                    .map(|m| m.name.clone())
                    .unwrap_or_else(|| "-".into());
                let weekly_off = match &u.weekly_off {
                    Some(days) => format_weekdays(days),
                    None => format!("{} (org)", format_weekdays(&db.calendar.org_weekly_off)),
                };
                println!("{:<5} {:<20} {:<20} {}", u.id, truncate(&u.name, 20), truncate(&manager, 20), weekly_off);
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build_recurrence(
    repeat: RecurrenceKind,
    interval: u32,
    days: &[String],
    day_of_month: Option<u8>,
    ordinal: Option<i8>,
    weekday: Option<&str>,
    until: Option<NaiveDate>,
    count: Option<u32>,
) -> EngineResult<RecurrenceConfig> {
    let end = match (until, count) {
        (Some(date), _) => RecurrenceEnd::OnDate { date },
        (None, Some(count)) => RecurrenceEnd::AfterOccurrences { count },
        (None, None) => RecurrenceEnd::Never,
    };
    Ok(match repeat {
        RecurrenceKind::None => RecurrenceConfig::None,
        RecurrenceKind::Daily => RecurrenceConfig::Daily { interval, end },
        RecurrenceKind::Custom => RecurrenceConfig::Custom { interval, end },
        RecurrenceKind::Yearly => RecurrenceConfig::Yearly { interval, end },
        RecurrenceKind::Weekly => RecurrenceConfig::Weekly {
            interval,
            days_of_week: weekday_set(days)?,
            end,
        },
        RecurrenceKind::Monthly => {
            let weekday = match weekday {
                Some(w) => {
                    let set = weekday_set(&[w.to_string()])?;
                    match set.len() {
                        1 => set.into_iter().next(),
                        _ => return Err(EngineError::Validation("--weekday takes a single day".into())),
                    }
                }
                None => None,
            };
            RecurrenceConfig::Monthly { interval, day_of_month, ordinal, weekday, end }
        }
    })
}

pub fn cmd_task(db: &mut Database, db_path: &Path, action: TaskAction, today: NaiveDate) -> EngineResult<()> {
    match action {
        TaskAction::Add {
            name, benchmark, anchor, repeat, interval, days, day_of_month,
            ordinal, weekday, until, count,
        } => {
            let anchor = date_or_today(anchor.as_deref(), today)?;
            let until = until.as_deref().map(|s| parse_date_arg(s, today)).transpose()?;
            let recurrence = build_recurrence(
                repeat, interval, &days, day_of_month, ordinal, weekday.as_deref(), until, count,
            )?;
            let id = db.add_task(&name, benchmark, anchor, recurrence, Utc::now().timestamp())?;
            db.save(db_path)?;
            println!("Added task {id}");
        }
        TaskAction::List => {
            println!("{:<5} {:<28} {:<11} {:<10} {}", "ID", "Name", "Anchor", "Benchmark", "Repeats");
            for t in &db.tasks {
                let benchmark = t.benchmark.map(|b| b.to_string()).unwrap_or_else(|| "-".into());
                println!(
                    "{:<5} {:<28} {:<11} {:<10} {}",
                    t.id,
                    truncate(&t.name, 28),
                    t.anchor_date.to_string(),
                    benchmark,
                    t.recurrence.describe()
                );
            }
        }
    }
    Ok(())
}

pub fn cmd_assign(
    db: &mut Database,
    db_path: &Path,
    task: String,
    to: String,
    by: Option<String>,
) -> EngineResult<()> {
    let task = task_id(&task, db)?;
    let to = user_id(&to, db)?;
    let by = match by {
        Some(by) => user_id(&by, db)?,
        None => to,
    };
    let assignment = db.assign_task(task, to, by, Utc::now().timestamp())?;
    db.save(db_path)?;
    println!(
        "Created assignment {} ({})",
        assignment.id,
        format_delegation(assignment.delegation)
    );
    Ok(())
}

pub fn cmd_depend(db: &mut Database, db_path: &Path, task: String, on: String) -> EngineResult<()> {
    let task = task_id(&task, db)?;
    let on = task_id(&on, db)?;
    db.add_dependency(task, on)?;
    db.save(db_path)?;
    println!("Task {task} now depends on task {on}");
    Ok(())
}

pub fn cmd_holiday(db: &mut Database, db_path: &Path, date: String, name: String, today: NaiveDate) -> EngineResult<()> {
    let date = parse_date_arg(&date, today)?;
    db.add_holiday(date, &name);
    db.save(db_path)?;
    println!("Added holiday {date} ({name})");
    Ok(())
}

pub fn cmd_leave(db: &mut Database, db_path: &Path, action: LeaveAction, today: NaiveDate) -> EngineResult<()> {
    match action {
        LeaveAction::Add { user, start, end, approved } => {
            let user = user_id(&user, db)?;
            let start = parse_date_arg(&start, today)?;
            let end = parse_date_arg(&end, today)?;
            let id = db.add_leave(user, start, end, approved)?;
            db.save(db_path)?;
            let state = if approved { "approved" } else { "awaiting approval" };
            println!("Recorded leave {id} for user {user}: {start} to {end} ({state})");
        }
        LeaveAction::Approve { id } => {
            db.approve_leave(id)?;
            db.save(db_path)?;
            println!("Approved leave {id}");
        }
    }
    Ok(())
}

pub fn cmd_weekly_off(
    db: &mut Database,
    db_path: &Path,
    user: Option<String>,
    org: bool,
    days: Vec<String>,
    clear: bool,
) -> EngineResult<()> {
    let days = weekday_set(&days)?;
    match (user, org) {
        (None, true) => {
            db.calendar.org_weekly_off = days.clone();
            println!("Org weekly off: {}", format_weekdays(&days));
        }
        (Some(user), false) => {
            let user = user_id(&user, db)?;
            if clear {
                db.set_user_weekly_off(user, None)?;
                println!("User {user} now follows the org weekly off");
            } else {
                println!("User {user} weekly off: {}", format_weekdays(&days));
                db.set_user_weekly_off(user, Some(days))?;
            }
        }
        _ => {
            return Err(EngineError::Validation(
                "give either a user or --org".into(),
            ))
        }
    }
    db.save(db_path)?;
    Ok(())
}

pub fn cmd_status(
    db: &Database,
    settings: EngineConfig,
    assignment: u64,
    date: Option<String>,
    today: NaiveDate,
) -> EngineResult<()> {
    let engine = StatusEngine::new(db, settings);
    let assignment = engine.assignment(assignment)?;
    let date = date_or_today(date.as_deref(), today)?;
    let status = engine.daily_status(&assignment, date, today)?;
    let name = db.get_task(assignment.task_id).map(|t| t.name.as_str()).unwrap_or("-");
    println!("{date} ({}) {name}: {}", format_relative(date, today), format_day_status(status));
    Ok(())
}

pub fn cmd_month(
    db: &Database,
    settings: EngineConfig,
    assignment: u64,
    month: Option<String>,
    today: NaiveDate,
) -> EngineResult<()> {
    let (year, month) = parse_month_input(month.as_deref(), today)
        .ok_or_else(|| EngineError::Validation("month must be YYYY-MM".into()))?;
    let engine = StatusEngine::new(db, settings);
    let assignment = engine.assignment(assignment)?;
    let days = engine.month_view(&assignment, year, month, today)?;
    let benchmark = engine.benchmark(&assignment)?;

    println!(
        "{:<11} {:<4} {:<16} {:<8} {:<9} {}",
        "Date", "Day", "Status", "Qty", "Approval", "Notes"
    );
    for day in &days {
        let status = match day.off_reason {
            Some(reason) if day.status == DayStatus::NotApplicable => reason.to_string(),
            _ => format_day_status(day.status).to_string(),
        };
        let quantity = day.quantity_completed.map(|q| q.to_string()).unwrap_or_else(|| "-".into());
        let notes = match (&day.notes, &day.manager_comment) {
            (Some(n), Some(c)) => format!("{n} [{c}]"),
            (Some(n), None) => n.clone(),
            (None, Some(c)) => format!("[{c}]"),
            (None, None) => String::new(),
        };
        println!(
            "{:<11} {:<4} {:<16} {:<8} {:<9} {}",
            day.date.to_string(),
            day.date.format("%a").to_string(),
            status,
            quantity,
            format_approval(day.approval_status),
            truncate(&notes, 40)
        );
    }

    let scores: Vec<DayScore> = days.iter().map(|d| d.score(benchmark)).collect();
    let summary = summarize(&scores);
    let counts: Vec<String> = DayStatus::ALL
        .iter()
        .filter(|s| **s != DayStatus::NotApplicable && summary.count(**s) > 0)
        .map(|s| format!("{} {}", format_day_status(*s), summary.count(*s)))
        .collect();
    println!();
    println!("Scheduled {}: {}", summary.scheduled, counts.join(", "));
    println!("Completion: {}%", summary.percentage);
    Ok(())
}

pub fn cmd_pending(db: &Database, settings: EngineConfig, user: String, today: NaiveDate) -> EngineResult<()> {
    let user = user_id(&user, db)?;
    let pending = StatusEngine::new(db, settings).pending_obligations(user, today)?;
    if pending.is_empty() {
        println!("Nothing pending.");
        return Ok(());
    }
    println!("{:<6} {:<11} {:<10} {}", "Asgmt", "Date", "When", "Task");
    for p in &pending {
        println!(
            "{:<6} {:<11} {:<10} {}",
            p.assignment_id,
            p.date.to_string(),
            format_relative(p.date, today),
            p.task_name
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_complete(
    db: &mut Database,
    db_path: &Path,
    assignment: u64,
    date: Option<String>,
    status: Option<CompletionStatus>,
    quantity: Option<f64>,
    not_done: bool,
    notes: Option<String>,
    today: NaiveDate,
) -> EngineResult<()> {
    let scheduled = date_or_today(date.as_deref(), today)?;
    let task = db
        .get_assignment(assignment)
        .and_then(|a| db.get_task(a.task_id))
        .ok_or_else(|| EngineError::NotFound(format!("assignment {assignment}")))?;

    let request = completion_request(task.benchmark, status, quantity, not_done, notes)?;
    let record = set_completion(db, assignment, scheduled, request, today)?;
    db.save(db_path)?;
    let shown = derive_status(Some(&record), WorkingDay::Working, true, scheduled, today);
    println!("Recorded {scheduled}: {}", format_day_status(shown));
    Ok(())
}

/// Turn the `complete` flags into a request. Quantities are kept as given so
/// the engine can validate them against the task's benchmark.
fn completion_request(
    benchmark: Option<f64>,
    status: Option<CompletionStatus>,
    quantity: Option<f64>,
    not_done: bool,
    notes: Option<String>,
) -> EngineResult<CompletionRequest> {
    match (status, quantity) {
        (Some(status), quantity) => Ok(CompletionRequest { status, quantity, notes }),
        (None, quantity) if not_done => Ok(CompletionRequest {
            status: CompletionStatus::NotDone,
            quantity: quantity.or(benchmark.map(|_| 0.0)),
            notes,
        }),
        (None, Some(quantity)) => {
            CompletionRequest::from_input(CompletionInput::Quantity { quantity }, benchmark, notes)
        }
        (None, None) => CompletionRequest::from_input(CompletionInput::Binary { done: true }, benchmark, notes),
    }
}

pub fn cmd_review(
    db: &mut Database,
    db_path: &Path,
    assignment: u64,
    date: String,
    reject: bool,
    comment: Option<String>,
    today: NaiveDate,
) -> EngineResult<()> {
    let date = parse_date_arg(&date, today)?;
    let record = review_completion(db, assignment, date, !reject, comment)?;
    db.save(db_path)?;
    println!("{date}: {}", format_approval(Some(record.approval_status)));
    Ok(())
}

pub fn cmd_next_working_day(
    db: &Database,
    settings: EngineConfig,
    user: String,
    date: Option<String>,
    today: NaiveDate,
) -> EngineResult<()> {
    let user = user_id(&user, db)?;
    let from = date_or_today(date.as_deref(), today)?;
    let next = StatusEngine::new(db, settings).next_working_day(user, from)?;
    println!("{next} ({})", format_relative(next, today));
    Ok(())
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) {
    use clap::CommandFactory;
    let mut cmd = crate::cli::Cli::command();
    generate(shell, &mut cmd, "cadence", &mut std::io::stdout());
}
