// src/types.rs

//! Small shared value types: task identities and behaviour enums.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a task inside one [`BuildGraph`](crate::dag::BuildGraph).
///
/// Ids are dense indices handed out by `add_task` in insertion order. They are
/// only meaningful for the graph that produced them; use [`TaskKey`] for
/// anything that must survive across process invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Persistent identity of a task, derived from its canonical output set.
///
/// The outputs are sorted and joined with a newline so that reordering the
/// `targets` of a declaration does not orphan its execution record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKey(String);

impl TaskKey {
    pub fn from_outputs<I, P>(outputs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut paths: Vec<PathBuf> = outputs
            .into_iter()
            .map(|p| p.as_ref().to_path_buf())
            .collect();
        paths.sort();
        paths.dedup();

        let joined = paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("\n");
        TaskKey(joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.replace('\n', " "))
    }
}

/// What the scheduler does once a task has failed.
///
/// - `Continue`: only the failed task's data dependents are skipped;
///   independent branches and ordering-only dependents keep running
///   (default).
/// - `Halt`: no new task is started after the first failure. Tasks that are
///   already running finish; everything not yet started is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Continue,
    Halt,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "continue" => Ok(FailurePolicy::Continue),
            "halt" => Ok(FailurePolicy::Halt),
            other => Err(format!(
                "invalid on_failure: {other} (expected \"continue\" or \"halt\")"
            )),
        }
    }
}

/// Number of parallel execution slots when none is configured.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
