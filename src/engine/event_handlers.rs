// src/engine/event_handlers.rs

//! Event handling logic for the build coordinator.

use tracing::{debug, info, warn};

use crate::dag::{RunState, ScheduledTask};
use crate::depfile;
use crate::engine::core::BuildCore;
use crate::engine::report::Outcome;
use crate::engine::TaskResult;
use crate::errors::ExecutionError;
use crate::stale::{StalenessEngine, Verdict};
use crate::types::TaskId;

/// Command produced by the coordinator, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
}

/// Decision returned by the coordinator after handling one event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl BuildCore<'_> {
    /// Resolve every task whose predecessors are done, then fill free slots.
    ///
    /// Fresh tasks resolve immediately and may unlock their dependents, so
    /// readiness is re-checked until nothing changes.
    pub(super) fn advance(&mut self) -> CoreStep {
        loop {
            let ready = self.scheduler.ready(self.graph);
            if ready.is_empty() {
                break;
            }
            for id in ready {
                self.resolve_ready_task(id);
            }
        }

        if self.scheduler.is_halted() {
            let dropped = self.queue.drain_waiting();
            if !dropped.is_empty() {
                debug!(count = dropped.len(), "halted; dropping queued tasks");
            }
        }

        let mut dispatch = Vec::new();
        while let Some(id) = self.queue.next_dispatchable() {
            if !matches!(self.scheduler.state_of(id), Some(RunState::Queued)) {
                // skipped while waiting for a slot
                self.queue.task_finished();
                continue;
            }
            let Some(node) = self.graph.task(id) else {
                self.queue.task_finished();
                continue;
            };

            let scheduled = ScheduledTask::from_task_node(node, self.graph.root().to_path_buf(), self.env);
            info!(
                task = %scheduled.label,
                reason = %self.reasons.get(&id).map(|r| r.to_string()).unwrap_or_default(),
                "running task"
            );
            self.scheduler.mark_running(id);
            self.dispatch_order.push(id);
            dispatch.push(scheduled);
        }

        let mut commands = Vec::new();
        if !dispatch.is_empty() {
            commands.push(CoreCommand::DispatchTasks(dispatch));
        }

        CoreStep {
            commands,
            keep_running: !self.scheduler.is_finished(),
        }
    }

    /// Evaluate a task whose predecessors are resolved: finish it as fresh,
    /// queue it for execution, or fail it.
    fn resolve_ready_task(&mut self, id: TaskId) {
        if let Some(err) = self.ingest_errors.remove(&id) {
            warn!(task = %id, error = %err, "dependency-list file could not be ingested");
            self.finish(id, Outcome::Failed(ExecutionError::Ingest(err)));
            return;
        }

        let Some(key) = self.graph.task(id).map(|n| n.key.clone()) else {
            return;
        };

        let record = match self.store.load(&key) {
            Ok(record) => record,
            Err(err) => {
                warn!(task = %key, error = %err, "could not load execution record; treating as never built");
                None
            }
        };

        let verdict = StalenessEngine::new(
            self.graph,
            self.fs,
            self.hasher,
            self.env,
            &mut self.cache,
        )
        .evaluate(id, record.as_ref(), &self.rebuilt);

        match verdict {
            Ok(Verdict::Fresh) => {
                debug!(task = %key, "up to date");
                self.finish(id, Outcome::Fresh);
            }
            Ok(Verdict::Stale(reason)) => {
                debug!(task = %key, reason = %reason, "stale; queueing");
                self.reasons.insert(id, reason);
                self.scheduler.mark_queued(id);
                self.queue.push(id);
            }
            Err(err) => {
                warn!(task = %key, error = %err, "could not evaluate task");
                self.finish(id, Outcome::Failed(err));
            }
        }
    }

    /// Handle a task completion event.
    pub(super) fn handle_task_completion(&mut self, task: TaskId, result: TaskResult) {
        self.queue.task_finished();

        if !matches!(self.scheduler.state_of(task), Some(RunState::Running)) {
            warn!(task = %task, "completion for a task that is not running; ignoring");
            return;
        }

        let Some(node) = self.graph.task(task) else {
            return;
        };
        let outputs = node.targets.clone();
        let label = node.label();

        // The command may have rewritten its outputs, even when it failed.
        for output in &outputs {
            self.cache.invalidate(output);
        }

        let outcome = match result.status.and_then(|()| self.complete_success(task)) {
            Ok(()) => {
                info!(task = %label, duration_ms = result.duration.as_millis() as u64, "task finished");
                self.rebuilt.extend(outputs);
                Outcome::Ran {
                    duration: result.duration,
                }
            }
            Err(err) => {
                warn!(task = %label, error = %err, "task failed");
                self.invalidate_record(task);
                Outcome::Failed(err)
            }
        };

        self.finish(task, outcome);
    }

    /// Post-processing of a command that exited successfully: verify outputs,
    /// re-ingest the dependency-list file and save the execution record.
    ///
    /// Readiness is re-checked only afterwards, so prerequisites the file
    /// reveals still gate dependents that have not started.
    fn complete_success(&mut self, task: TaskId) -> Result<(), ExecutionError> {
        let (outputs, key) = match self.graph.task(task) {
            Some(node) => (node.targets.clone(), node.key.clone()),
            None => return Ok(()),
        };

        for output in &outputs {
            let present = self
                .fs
                .metadata(output)
                .map_err(|e| ExecutionError::Fingerprint {
                    path: output.clone(),
                    message: format!("{e:#}"),
                })?
                .is_some();
            if !present {
                return Err(ExecutionError::MissingOutput(output.clone()));
            }
        }

        depfile::ingest(self.graph, self.fs, task).map_err(ExecutionError::Ingest)?;

        // The file may also name outputs of tasks that have not started yet.
        let waiting: Vec<TaskId> = self
            .scheduler
            .task_ids()
            .filter(|id| *id == task || matches!(self.scheduler.state_of(*id), Some(RunState::Pending)))
            .collect();
        for id in waiting {
            for pred in self.graph.predecessors(id) {
                if self.scheduler.contains(pred) {
                    continue;
                }
                let added = self.scheduler.include(self.graph, pred);
                if !added.is_empty() {
                    info!(
                        task = %id,
                        producer = %pred,
                        added = added.len(),
                        "discovered prerequisite produced outside the selection; adding producer to the run"
                    );
                }
            }
        }

        let record = StalenessEngine::new(
            self.graph,
            self.fs,
            self.hasher,
            self.env,
            &mut self.cache,
        )
        .snapshot(task)?;

        if let Err(err) = self.store.save(&key, record) {
            warn!(
                task = %key,
                error = %err,
                "could not persist execution record; task will be rebuilt next time"
            );
            if let Err(err) = self.store.invalidate(&key) {
                warn!(task = %key, error = %err, "could not invalidate execution record");
            }
        }

        Ok(())
    }

    fn invalidate_record(&mut self, task: TaskId) {
        let Some(key) = self.graph.task(task).map(|n| n.key.clone()) else {
            return;
        };
        if let Err(err) = self.store.invalidate(&key) {
            warn!(task = %key, error = %err, "could not invalidate execution record");
        }
    }

    /// Record a terminal outcome and the skips it causes.
    fn finish(&mut self, id: TaskId, outcome: Outcome) {
        let step = self.scheduler.finish(self.graph, id, outcome);
        self.completion_order.push(id);
        self.completion_order.extend(step.newly_skipped);
        if step.run_just_finished {
            debug!(last = %id, "every task of the run is resolved");
        }
    }
}
