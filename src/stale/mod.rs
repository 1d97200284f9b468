// src/stale/mod.rs

//! Staleness engine.
//!
//! Decides, for one task whose data predecessors have all been resolved in
//! the current run, whether its command has to run again. The answer is
//! either [`Verdict::Fresh`] or the first [`StaleReason`] that applies, in
//! this order: no record, missing output, command changed, env changed,
//! input rebuilt in this run, data predecessor ran in this run, input set
//! changed, input content changed.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use crate::dag::BuildGraph;
use crate::env::EnvSource;
use crate::errors::{ExecutionError, GraphError, IngestError};
use crate::fingerprint::{ContentHasher, FileCache, FileStamp};
use crate::fs::FileSystem;
use crate::store::ExecutionRecord;
use crate::types::TaskId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// The task has never completed successfully.
    NoRecord,
    OutputMissing(PathBuf),
    CommandChanged,
    EnvChanged(String),
    /// A producer of this input ran in the current run.
    InputRebuilt(PathBuf),
    /// A `depends_on` predecessor (named by its primary target) ran in the
    /// current run.
    DependencyRebuilt(PathBuf),
    /// An input that was not part of the last successful run.
    InputAdded(PathBuf),
    /// An input of the last successful run that no longer applies.
    InputRemoved(PathBuf),
    /// A discovered prerequisite that no longer exists.
    InputMissing(PathBuf),
    InputChanged(PathBuf),
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::NoRecord => write!(f, "never built"),
            StaleReason::OutputMissing(p) => write!(f, "output {} missing", p.display()),
            StaleReason::CommandChanged => write!(f, "command changed"),
            StaleReason::EnvChanged(name) => write!(f, "env var {name} changed"),
            StaleReason::InputRebuilt(p) => write!(f, "input {} rebuilt", p.display()),
            StaleReason::DependencyRebuilt(p) => write!(f, "dependency {} rebuilt", p.display()),
            StaleReason::InputAdded(p) => write!(f, "new input {}", p.display()),
            StaleReason::InputRemoved(p) => write!(f, "input {} no longer used", p.display()),
            StaleReason::InputMissing(p) => write!(f, "input {} missing", p.display()),
            StaleReason::InputChanged(p) => write!(f, "input {} changed", p.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Fresh,
    Stale(StaleReason),
}

impl Verdict {
    pub fn is_stale(&self) -> bool {
        matches!(self, Verdict::Stale(_))
    }
}

/// Everything the engine reads from, borrowed for one evaluation.
pub struct StalenessEngine<'a> {
    graph: &'a BuildGraph,
    fs: &'a dyn FileSystem,
    hasher: &'a dyn ContentHasher,
    env: &'a dyn EnvSource,
    cache: &'a mut FileCache,
}

impl<'a> StalenessEngine<'a> {
    pub fn new(
        graph: &'a BuildGraph,
        fs: &'a dyn FileSystem,
        hasher: &'a dyn ContentHasher,
        env: &'a dyn EnvSource,
        cache: &'a mut FileCache,
    ) -> Self {
        Self {
            graph,
            fs,
            hasher,
            env,
            cache,
        }
    }

    /// Decide whether `task` must run.
    ///
    /// `rebuilt` holds every output path written by a task that ran earlier
    /// in this run. Fails with [`ExecutionError::MissingInput`] when a
    /// declared input has no producer and does not exist.
    pub fn evaluate(
        &mut self,
        task: TaskId,
        record: Option<&ExecutionRecord>,
        rebuilt: &HashSet<PathBuf>,
    ) -> Result<Verdict, ExecutionError> {
        let graph = self.graph;
        let node = graph
            .task(task)
            .ok_or(IngestError::Graph(GraphError::UnknownTask(task)))?;

        self.check_sources(task)?;

        let Some(record) = record else {
            return Ok(Verdict::Stale(StaleReason::NoRecord));
        };

        for output in &node.targets {
            if self.metadata_exists(output)? {
                continue;
            }
            return Ok(Verdict::Stale(StaleReason::OutputMissing(output.clone())));
        }

        if record.command != node.command {
            return Ok(Verdict::Stale(StaleReason::CommandChanged));
        }

        let current_env = self.env_values(task);
        for (name, value) in &current_env {
            if record.env.get(name) != Some(value) {
                return Ok(Verdict::Stale(StaleReason::EnvChanged(name.clone())));
            }
        }
        if let Some(name) = record.env.keys().find(|name| !current_env.contains_key(*name)) {
            return Ok(Verdict::Stale(StaleReason::EnvChanged(name.clone())));
        }

        let inputs = self.present_inputs(task)?;

        if let Some(path) = inputs.iter().find(|p| rebuilt.contains(*p)) {
            return Ok(Verdict::Stale(StaleReason::InputRebuilt(path.clone())));
        }

        // A predecessor ran iff it wrote its outputs in this run.
        let ran_predecessor = graph
            .predecessors(task)
            .into_iter()
            .filter_map(|pred| graph.task(pred))
            .find(|pred| pred.targets.iter().any(|t| rebuilt.contains(t)));
        if let Some(pred) = ran_predecessor {
            return Ok(Verdict::Stale(StaleReason::DependencyRebuilt(
                pred.primary_target().clone(),
            )));
        }

        if let Some(path) = inputs.iter().find(|p| !record.inputs.contains_key(*p)) {
            return Ok(Verdict::Stale(StaleReason::InputAdded(path.clone())));
        }
        if let Some(path) = record.inputs.keys().find(|p| !inputs.contains(*p)) {
            return Ok(Verdict::Stale(StaleReason::InputRemoved(path.clone())));
        }

        for path in &inputs {
            let previous = record.inputs.get(path);
            let current = self.stamp(path, previous)?;
            match (current, previous) {
                (None, _) => {
                    return Ok(Verdict::Stale(StaleReason::InputMissing(path.clone())));
                }
                (Some(current), Some(previous)) if current.digest != previous.digest => {
                    trace!(
                        task = %task,
                        path = ?path,
                        recorded = %previous.digest,
                        current = %current.digest,
                        "input digest differs"
                    );
                    return Ok(Verdict::Stale(StaleReason::InputChanged(path.clone())));
                }
                _ => {}
            }
        }

        debug!(task = %task, "task is up to date");
        Ok(Verdict::Fresh)
    }

    /// Record describing the task's current state, taken after its command
    /// succeeded.
    pub fn snapshot(&mut self, task: TaskId) -> Result<ExecutionRecord, ExecutionError> {
        let graph = self.graph;
        let node = graph
            .task(task)
            .ok_or(IngestError::Graph(GraphError::UnknownTask(task)))?;

        let mut inputs = BTreeMap::new();
        for path in graph.resolved_inputs(task) {
            match self.stamp(&path, None)? {
                Some(stamp) => {
                    inputs.insert(path, stamp);
                }
                None if graph.is_optional_input(task, &path) => {
                    trace!(task = %task, path = ?path, "optional input absent");
                }
                None if graph.is_static_input(task, &path) => {
                    return Err(ExecutionError::MissingInput(path));
                }
                None => {
                    warn!(
                        task = %task,
                        path = ?path,
                        "discovered prerequisite does not exist; not recording it"
                    );
                }
            }
        }

        Ok(ExecutionRecord {
            command: node.command.clone(),
            env: self.env_values(task),
            inputs,
            outputs: node.targets.clone(),
        })
    }

    fn check_sources(&mut self, task: TaskId) -> Result<(), ExecutionError> {
        let graph = self.graph;
        let Some(node) = graph.task(task) else {
            return Ok(());
        };
        for input in &node.inputs {
            if graph.producer_of(input).is_some() || node.optional_inputs.contains(input) {
                continue;
            }
            if !self.metadata_exists(input)? {
                return Err(ExecutionError::MissingInput(input.clone()));
            }
        }
        Ok(())
    }

    /// Resolved inputs, minus optional inputs that do not exist right now.
    /// An absent optional input is recorded by its absence, so it appearing
    /// reads as an added input and it vanishing as a removed one.
    fn present_inputs(&self, task: TaskId) -> Result<Vec<PathBuf>, ExecutionError> {
        let graph = self.graph;
        let mut present = Vec::new();
        for path in graph.resolved_inputs(task) {
            if graph.is_optional_input(task, &path) && !self.metadata_exists(&path)? {
                continue;
            }
            present.push(path);
        }
        Ok(present)
    }

    fn env_values(&self, task: TaskId) -> BTreeMap<String, Option<String>> {
        self.graph
            .task(task)
            .map(|node| {
                node.env
                    .iter()
                    .map(|spec| (spec.name().to_string(), self.env.resolve(spec)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn metadata_exists(&self, path: &Path) -> Result<bool, ExecutionError> {
        self.fs
            .metadata(path)
            .map(|m| m.is_some())
            .map_err(|e| ExecutionError::Fingerprint {
                path: path.to_path_buf(),
                message: format!("{e:#}"),
            })
    }

    fn stamp(
        &mut self,
        path: &Path,
        previous: Option<&FileStamp>,
    ) -> Result<Option<FileStamp>, ExecutionError> {
        self.cache
            .stamp(self.fs, self.hasher, path, previous)
            .map_err(|e| ExecutionError::Fingerprint {
                path: path.to_path_buf(),
                message: format!("{e:#}"),
            })
    }
}
