// src/dag/task_info.rs

//! Task declarations (what the front-end hands to the graph) and the
//! per-task payload the scheduler hands to the executor.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use crate::engine::report::Outcome;
use crate::env::EnvSource;
use crate::types::{TaskId, TaskKey};

/// An environment variable a task depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvSpec {
    /// Value is read from the orchestrator's own environment.
    Inherit(String),
    /// Value is fixed by the declaration and exported to the command.
    Define { name: String, value: String },
}

impl EnvSpec {
    pub fn name(&self) -> &str {
        match self {
            EnvSpec::Inherit(name) => name,
            EnvSpec::Define { name, .. } => name,
        }
    }
}

/// Reference from one declaration to a task that was added earlier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRef {
    /// Id returned by a previous `add_task`.
    Id(TaskId),
    /// Any declared target of the referenced task.
    Target(PathBuf),
}

impl From<TaskId> for TaskRef {
    fn from(id: TaskId) -> Self {
        TaskRef::Id(id)
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskRef::Id(id) => write!(f, "task {id}"),
            TaskRef::Target(path) => write!(f, "target {}", path.display()),
        }
    }
}

/// A finalized task declaration as produced by a front-end.
///
/// No configuration syntax crosses this boundary: paths are plain paths and
/// the command is an already-resolved argument vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDeclaration {
    /// Output files; the first one is the primary target.
    pub targets: Vec<PathBuf>,
    /// Input files, in the order the command sees them.
    pub inputs: Vec<PathBuf>,
    /// Inputs the command reads only when they exist. Absent ones are not
    /// an error; their appearing or disappearing makes the task stale.
    pub optional_inputs: Vec<PathBuf>,
    pub env: Vec<EnvSpec>,
    /// Data + ordering predecessors.
    pub depends_on: Vec<TaskRef>,
    /// Ordering-only predecessors.
    pub not_before: Vec<TaskRef>,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    /// Dependency-list file written by the command. Defaults to the first
    /// target with a `.d` extension.
    pub depfile: Option<PathBuf>,
}

/// A task as stored in the graph: normalised paths and resolved references.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub id: TaskId,
    pub key: TaskKey,
    pub targets: Vec<PathBuf>,
    /// Declared inputs, optional ones included.
    pub inputs: Vec<PathBuf>,
    pub optional_inputs: BTreeSet<PathBuf>,
    pub env: Vec<EnvSpec>,
    pub depends_on: BTreeSet<TaskId>,
    pub not_before: BTreeSet<TaskId>,
    pub command: Vec<String>,
    pub depfile: Option<PathBuf>,
    /// Prerequisites discovered from dependency-list files: the union of
    /// `dynamic_sources`.
    pub dynamic_inputs: BTreeSet<PathBuf>,
    /// What each ingested dependency-list file last contributed.
    pub(crate) dynamic_sources: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    /// Reverse of `depends_on`.
    pub(crate) depended_on_by: BTreeSet<TaskId>,
    /// Reverse of `not_before`.
    pub(crate) ordered_before: BTreeSet<TaskId>,
}

impl TaskNode {
    pub fn primary_target(&self) -> &PathBuf {
        // add_task rejects declarations without targets
        &self.targets[0]
    }

    /// Human-readable name used in logs and reports.
    pub fn label(&self) -> String {
        self.primary_target().display().to_string()
    }
}

/// Description of a task that the scheduler wants the executor to run now.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub label: String,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    /// The command's complete environment: every declared variable that
    /// has a value. Nothing else is inherited.
    pub env: Vec<(String, String)>,
    /// Working directory for the command.
    pub working_dir: PathBuf,
    pub outputs: Vec<PathBuf>,
}

impl ScheduledTask {
    /// `env` must be the same source the staleness engine fingerprinted,
    /// so the command sees exactly the recorded values.
    pub fn from_task_node(node: &TaskNode, working_dir: PathBuf, env: &dyn EnvSource) -> Self {
        let env = node
            .env
            .iter()
            .filter_map(|spec| env.resolve(spec).map(|value| (spec.name().to_string(), value)))
            .collect();

        Self {
            id: node.id,
            label: node.label(),
            command: node.command.clone(),
            env,
            working_dir,
            outputs: node.targets.clone(),
        }
    }
}

/// Per-run state of a task participating in a build.
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    /// Waiting for predecessors.
    Pending,
    /// Found stale, waiting for a free execution slot.
    Queued,
    Running,
    Done(Outcome),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done(_))
    }

    /// Terminal with an outcome that lets data dependents proceed.
    pub fn is_resolved_ok(&self) -> bool {
        matches!(self, RunState::Done(outcome) if outcome.is_success())
    }
}
