// src/engine/core.rs

//! Synchronous build coordinator.
//!
//! [`BuildCore`] is the single authority that mutates the graph (dynamic
//! edges), the per-run scheduler state and the record store. It consumes
//! [`RuntimeEvent`]s and produces [`CoreStep`]s describing what the IO shell
//! should do next; it never awaits, spawns or talks to a channel itself.
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for:
//! - reading completion events from the channel
//! - sending `ScheduledTask`s to the executor
//!
//! With a fake executor feeding events by hand the whole decision engine
//! can be tested without Tokio or processes.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

use tracing::debug;

use crate::dag::{BuildGraph, Scheduler};
use crate::engine::event_handlers::CoreStep;
use crate::engine::queue::SlotQueue;
use crate::engine::report::{ExecutionReport, TaskReport};
use crate::engine::{RunOptions, RuntimeEvent};
use crate::env::EnvSource;
use crate::errors::IngestError;
use crate::fingerprint::{ContentHasher, FileCache};
use crate::fs::FileSystem;
use crate::stale::StaleReason;
use crate::store::RecordStore;
use crate::types::TaskId;

/// Coordinator state for one build run.
pub struct BuildCore<'a> {
    pub(super) graph: &'a mut BuildGraph,
    pub(super) store: &'a mut dyn RecordStore,
    pub(super) fs: &'a dyn FileSystem,
    pub(super) hasher: &'a dyn ContentHasher,
    pub(super) env: &'a dyn EnvSource,
    pub(super) scheduler: Scheduler,
    pub(super) queue: SlotQueue,
    pub(super) cache: FileCache,
    /// Output paths written by tasks that ran in this run.
    pub(super) rebuilt: HashSet<PathBuf>,
    pub(super) reasons: HashMap<TaskId, StaleReason>,
    /// Dependency-list files that could not be ingested before the run.
    pub(super) ingest_errors: HashMap<TaskId, IngestError>,
    pub(super) dispatch_order: Vec<TaskId>,
    pub(super) completion_order: Vec<TaskId>,
}

impl std::fmt::Debug for BuildCore<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildCore")
            .field("scheduler", &self.scheduler)
            .field("queue", &self.queue)
            .field("rebuilt", &self.rebuilt.len())
            .finish_non_exhaustive()
    }
}

impl<'a> BuildCore<'a> {
    pub fn new(
        graph: &'a mut BuildGraph,
        store: &'a mut dyn RecordStore,
        fs: &'a dyn FileSystem,
        hasher: &'a dyn ContentHasher,
        env: &'a dyn EnvSource,
        options: RunOptions,
    ) -> Self {
        Self {
            graph,
            store,
            fs,
            hasher,
            env,
            scheduler: Scheduler::new(options.on_failure),
            queue: SlotQueue::new(options.jobs),
            cache: FileCache::new(),
            rebuilt: HashSet::new(),
            reasons: HashMap::new(),
            ingest_errors: HashMap::new(),
            dispatch_order: Vec::new(),
            completion_order: Vec::new(),
        }
    }

    /// Remember that a task's dependency-list file failed to ingest before
    /// the run; the task fails when it becomes ready.
    pub fn set_ingest_errors(&mut self, errors: HashMap<TaskId, IngestError>) {
        self.ingest_errors = errors;
    }

    /// Start the run over `selection` and return the first dispatches.
    pub fn start(&mut self, selection: BTreeSet<TaskId>) -> CoreStep {
        debug!(tasks = selection.len(), jobs = self.queue.jobs(), "build core starting");
        self.scheduler.start_run(selection);
        self.advance()
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TaskCompleted { task, result } => {
                self.handle_task_completion(task, result);
                self.advance()
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    /// Number of dispatched tasks still waiting for a completion event.
    pub fn running(&self) -> usize {
        self.queue.running()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Consume the core and assemble the report.
    pub fn into_report(mut self) -> ExecutionReport {
        let outcomes = self.scheduler.take_outcomes();
        let mut tasks = BTreeMap::new();

        for (id, outcome) in outcomes {
            let label = self
                .graph
                .task(id)
                .map(|n| n.label())
                .unwrap_or_else(|| id.to_string());
            let reason = self.reasons.remove(&id);
            tasks.insert(
                id,
                TaskReport {
                    id,
                    label,
                    outcome,
                    reason,
                },
            );
        }

        ExecutionReport::new(tasks, self.dispatch_order, self.completion_order)
    }
}
