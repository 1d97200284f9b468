// src/dag/scheduler.rs

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::dag::graph::BuildGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::dag::task_info::RunState;
use crate::engine::report::Outcome;
use crate::types::{FailurePolicy, TaskId};

/// Per-run task state plus the rules for moving between states.
///
/// It is responsible for:
/// - remembering which tasks take part in the current run
/// - deciding when a pending task may be evaluated
/// - recording terminal outcomes
/// - skipping data dependents of failed tasks (or everything not yet
///   started, under [`FailurePolicy::Halt`])
///
/// The scheduler does not own the graph; every call that needs edges takes
/// it as an argument so the engine can keep mutating dynamic edges between
/// steps.
#[derive(Debug, Default)]
pub struct Scheduler {
    states: BTreeMap<TaskId, RunState>,
    policy: FailurePolicy,
    /// First failure of the run, once there is one.
    first_failure: Option<TaskId>,
}

impl Scheduler {
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            states: BTreeMap::new(),
            policy,
            first_failure: None,
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Start a new run over `selection`. All of them begin `Pending`.
    pub fn start_run<I>(&mut self, selection: I)
    where
        I: IntoIterator<Item = TaskId>,
    {
        self.states = selection
            .into_iter()
            .map(|id| (id, RunState::Pending))
            .collect();
        self.first_failure = None;

        info!(tasks = self.states.len(), "scheduler: starting build run");
    }

    /// Pull a task (and its transitive data predecessors) into the active
    /// run. Returns the tasks that were not already part of it.
    ///
    /// Used when a dependency-list file reveals a producer that the current
    /// selection did not contain.
    pub fn include(&mut self, graph: &BuildGraph, id: TaskId) -> Vec<TaskId> {
        let mut added = Vec::new();
        for task in graph.data_closure([id]) {
            if self.states.contains_key(&task) {
                continue;
            }
            let state = match self.first_failure {
                Some(cause) if self.policy == FailurePolicy::Halt => {
                    RunState::Done(Outcome::Skipped { cause })
                }
                _ => RunState::Pending,
            };
            debug!(task = %task, "pulling task into the active run");
            self.states.insert(task, state);
            added.push(task);
        }
        added
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.states.contains_key(&id)
    }

    pub fn state_of(&self, id: TaskId) -> Option<&RunState> {
        self.states.get(&id)
    }

    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.states.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Whether `id` may be evaluated now (see [`ReadOnlyStateManager`]).
    pub fn deps_satisfied(&self, graph: &BuildGraph, id: TaskId) -> bool {
        ReadOnlyStateManager::new(graph, &self.states).deps_satisfied(id)
    }

    /// Pending tasks whose predecessors are resolved.
    pub fn ready(&mut self, graph: &BuildGraph) -> Vec<TaskId> {
        StateManager::new(graph, &mut self.states).collect_ready()
    }

    /// Whether no new task may start because of an earlier failure.
    pub fn is_halted(&self) -> bool {
        self.policy == FailurePolicy::Halt && self.first_failure.is_some()
    }

    /// Whether every task of the run reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.states.values().all(RunState::is_terminal)
    }

    /// Stale task waiting for a slot.
    pub fn mark_queued(&mut self, id: TaskId) {
        self.transition(id, RunState::Queued);
    }

    pub fn mark_running(&mut self, id: TaskId) {
        self.transition(id, RunState::Running);
    }

    fn transition(&mut self, id: TaskId, next: RunState) {
        match self.states.get_mut(&id) {
            Some(state) if !state.is_terminal() => {
                debug!(task = %id, from = ?state, to = ?next, "task state change");
                *state = next;
            }
            Some(state) => {
                warn!(task = %id, state = ?state, to = ?next, "ignoring transition of terminal task");
            }
            None => warn!(task = %id, "transition for task outside the run; ignoring"),
        }
    }

    /// Record a terminal outcome and cascade failures.
    pub fn finish(&mut self, graph: &BuildGraph, id: TaskId, outcome: Outcome) -> SchedulerStep {
        let failed = outcome.is_failure();

        match self.states.get_mut(&id) {
            Some(state) if !state.is_terminal() => {
                *state = RunState::Done(outcome);
            }
            Some(_) => {
                warn!(task = %id, "task already terminal; ignoring second outcome");
                return SchedulerStep::default();
            }
            None => {
                warn!(task = %id, "completion for task outside the run; ignoring");
                return SchedulerStep::default();
            }
        }

        let mut newly_skipped = Vec::new();
        if failed {
            if self.first_failure.is_none() {
                self.first_failure = Some(id);
            }

            let mut manager = StateManager::new(graph, &mut self.states);
            newly_skipped = match self.policy {
                FailurePolicy::Continue => manager.mark_dependents_skipped(id),
                FailurePolicy::Halt => manager.skip_all_not_started(id),
            };
            warn!(
                task = %id,
                skipped = newly_skipped.len(),
                policy = ?self.policy,
                "task failed"
            );
        }

        let run_just_finished = self.is_finished();
        if run_just_finished {
            info!("scheduler: all tasks terminal; run finished");
        }

        SchedulerStep {
            newly_skipped,
            run_just_finished,
        }
    }

    /// Terminal outcomes of every task, consuming the run state.
    pub fn take_outcomes(&mut self) -> BTreeMap<TaskId, Outcome> {
        std::mem::take(&mut self.states)
            .into_iter()
            .filter_map(|(id, state)| match state {
                RunState::Done(outcome) => Some((id, outcome)),
                other => {
                    warn!(task = %id, state = ?other, "task did not reach a terminal state");
                    None
                }
            })
            .collect()
    }
}
