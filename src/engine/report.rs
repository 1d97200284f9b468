// src/engine/report.rs

//! Build results: per-task outcomes of a run and the dry-run plan.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::errors::ExecutionError;
use crate::stale::StaleReason;
use crate::types::TaskId;

/// Terminal outcome of one task in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Up to date; the command did not run.
    Fresh,
    Ran { duration: Duration },
    Failed(ExecutionError),
    /// Not attempted because `cause` failed.
    Skipped { cause: TaskId },
}

impl Outcome {
    /// `Fresh` or `Ran`: data dependents may proceed.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Fresh | Outcome::Ran { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Fresh => write!(f, "fresh"),
            Outcome::Ran { duration } => write!(f, "ran in {:.2}s", duration.as_secs_f64()),
            Outcome::Failed(err) => write!(f, "FAILED: {err}"),
            Outcome::Skipped { cause } => write!(f, "skipped (task {cause} failed)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub id: TaskId,
    pub label: String,
    pub outcome: Outcome,
    /// Why the task was considered stale, when it was.
    pub reason: Option<StaleReason>,
}

/// Result of one build: exactly one outcome per task in the run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    tasks: BTreeMap<TaskId, TaskReport>,
    /// Tasks in the order their commands were dispatched.
    dispatch_order: Vec<TaskId>,
    /// Tasks in the order they reached a terminal outcome.
    completion_order: Vec<TaskId>,
}

impl ExecutionReport {
    pub(crate) fn new(
        tasks: BTreeMap<TaskId, TaskReport>,
        dispatch_order: Vec<TaskId>,
        completion_order: Vec<TaskId>,
    ) -> Self {
        Self {
            tasks,
            dispatch_order,
            completion_order,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskReport> {
        self.tasks.get(&id)
    }

    pub fn outcome(&self, id: TaskId) -> Option<&Outcome> {
        self.tasks.get(&id).map(|r| &r.outcome)
    }

    /// Report entries in task id order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks.values()
    }

    pub fn dispatch_order(&self) -> &[TaskId] {
        &self.dispatch_order
    }

    pub fn completion_order(&self) -> &[TaskId] {
        &self.completion_order
    }

    fn ids_where(&self, pred: impl Fn(&Outcome) -> bool) -> Vec<TaskId> {
        self.tasks
            .values()
            .filter(|r| pred(&r.outcome))
            .map(|r| r.id)
            .collect()
    }

    pub fn ran(&self) -> Vec<TaskId> {
        self.ids_where(|o| matches!(o, Outcome::Ran { .. }))
    }

    pub fn fresh(&self) -> Vec<TaskId> {
        self.ids_where(|o| matches!(o, Outcome::Fresh))
    }

    pub fn failed(&self) -> Vec<TaskId> {
        self.ids_where(Outcome::is_failure)
    }

    pub fn skipped(&self) -> Vec<TaskId> {
        self.ids_where(|o| matches!(o, Outcome::Skipped { .. }))
    }

    /// No task failed (and therefore none was skipped).
    pub fn is_success(&self) -> bool {
        self.tasks.values().all(|r| r.outcome.is_success())
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in self.tasks.values() {
            write!(f, "{:<8} {}", short_status(&report.outcome), report.label)?;
            match (&report.outcome, &report.reason) {
                (Outcome::Ran { duration }, Some(reason)) => {
                    write!(f, " ({reason}; {:.2}s)", duration.as_secs_f64())?
                }
                (Outcome::Failed(err), _) => write!(f, ": {err}")?,
                (Outcome::Skipped { cause }, _) => match self.tasks.get(cause) {
                    Some(c) => write!(f, " (because {} failed)", c.label)?,
                    None => write!(f, " (because task {cause} failed)")?,
                },
                _ => {}
            }
            writeln!(f)?;
        }
        write!(
            f,
            "{} ran, {} fresh, {} failed, {} skipped",
            self.ran().len(),
            self.fresh().len(),
            self.failed().len(),
            self.skipped().len()
        )
    }
}

fn short_status(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Fresh => "fresh",
        Outcome::Ran { .. } => "ran",
        Outcome::Failed(_) => "FAILED",
        Outcome::Skipped { .. } => "skipped",
    }
}

/// What a build would do for one task, without running anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    UpToDate,
    Run(StaleReason),
    /// The task would fail before its command starts (e.g. a missing source).
    Fail(ExecutionError),
    Skip { cause: TaskId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub id: TaskId,
    pub label: String,
    pub action: PlanAction,
}

/// Dry-run result, in a valid execution order.
#[derive(Debug, Clone, Default)]
pub struct BuildPlan {
    pub entries: Vec<PlanEntry>,
}

impl BuildPlan {
    pub fn action(&self, id: TaskId) -> Option<&PlanAction> {
        self.entries.iter().find(|e| e.id == id).map(|e| &e.action)
    }

    /// Tasks whose command would run.
    pub fn to_run(&self) -> Vec<TaskId> {
        self.entries
            .iter()
            .filter(|e| matches!(e.action, PlanAction::Run(_)))
            .map(|e| e.id)
            .collect()
    }
}

impl fmt::Display for BuildPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            match &entry.action {
                PlanAction::UpToDate => writeln!(f, "fresh    {}", entry.label)?,
                PlanAction::Run(reason) => writeln!(f, "run      {} ({reason})", entry.label)?,
                PlanAction::Fail(err) => writeln!(f, "fail     {}: {err}", entry.label)?,
                PlanAction::Skip { cause } => {
                    writeln!(f, "skip     {} (task {cause} would fail)", entry.label)?
                }
            }
        }
        write!(f, "{} of {} tasks would run", self.to_run().len(), self.entries.len())
    }
}
