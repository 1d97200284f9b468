// src/dag/state_manager.rs

//! Per-run state management for tasks in the scheduler.

use std::collections::BTreeMap;

use tracing::debug;

use crate::dag::task_info::RunState;
use crate::dag::BuildGraph;
use crate::engine::report::Outcome;
use crate::types::TaskId;

/// Manages per-run state transitions for tasks.
pub struct StateManager<'a> {
    graph: &'a BuildGraph,
    states: &'a mut BTreeMap<TaskId, RunState>,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a BuildGraph, states: &'a mut BTreeMap<TaskId, RunState>) -> Self {
        Self { graph, states }
    }

    /// Mark every transitive data dependent of `failed` that has not started
    /// yet as `Skipped`.
    ///
    /// Ordering-only dependents are left alone: `not_before` never
    /// propagates failure. Returns the newly skipped tasks.
    pub fn mark_dependents_skipped(&mut self, failed: TaskId) -> Vec<TaskId> {
        let mut stack: Vec<TaskId> = self.graph.dependents(failed).into_iter().collect();
        let mut newly_skipped = Vec::new();

        while let Some(id) = stack.pop() {
            let Some(state) = self.states.get_mut(&id) else {
                continue;
            };
            match state {
                RunState::Pending | RunState::Queued => {
                    *state = RunState::Done(Outcome::Skipped { cause: failed });
                    debug!(task = %id, cause = %failed, "skipping dependent of failed task");
                    newly_skipped.push(id);
                    stack.extend(self.graph.dependents(id));
                }
                RunState::Running | RunState::Done(_) => {}
            }
        }

        newly_skipped
    }

    /// Mark every task that has not started yet as `Skipped`.
    pub fn skip_all_not_started(&mut self, cause: TaskId) -> Vec<TaskId> {
        let mut newly_skipped = Vec::new();
        for (id, state) in self.states.iter_mut() {
            if matches!(state, RunState::Pending | RunState::Queued) {
                *state = RunState::Done(Outcome::Skipped { cause });
                newly_skipped.push(*id);
            }
        }
        if !newly_skipped.is_empty() {
            debug!(count = newly_skipped.len(), cause = %cause, "halting: skipped every task not yet started");
        }
        newly_skipped
    }

    /// Pending tasks whose predecessors allow them to proceed, in id order.
    pub fn collect_ready(&self) -> Vec<TaskId> {
        let ro = ReadOnlyStateManager::new(self.graph, self.states);
        self.states
            .iter()
            .filter(|(_, state)| matches!(state, RunState::Pending))
            .filter(|(id, _)| ro.deps_satisfied(**id))
            .map(|(id, _)| *id)
            .collect()
    }
}

/// A read-only view used for readiness checks.
pub struct ReadOnlyStateManager<'a> {
    graph: &'a BuildGraph,
    states: &'a BTreeMap<TaskId, RunState>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(graph: &'a BuildGraph, states: &'a BTreeMap<TaskId, RunState>) -> Self {
        Self { graph, states }
    }

    /// Whether `id` may be evaluated now.
    ///
    /// Every data predecessor in the run must be `Fresh` or `Ran`; every
    /// ordering predecessor in the run must be terminal, whatever its
    /// outcome. Predecessors outside the run do not constrain the task.
    pub fn deps_satisfied(&self, id: TaskId) -> bool {
        let data_ok = self
            .graph
            .predecessors(id)
            .iter()
            .all(|pred| self.states.get(pred).is_none_or(RunState::is_resolved_ok));

        data_ok
            && self
                .graph
                .ordering_only(id)
                .iter()
                .all(|pred| self.states.get(pred).is_none_or(RunState::is_terminal))
    }
}
