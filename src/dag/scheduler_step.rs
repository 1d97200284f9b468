// src/dag/scheduler_step.rs

//! Result type for a single scheduler transition.

use crate::types::TaskId;

/// Structured result of one scheduler "step".
///
/// Useful for tests that drive the scheduler by hand and assert on what
/// changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStep {
    /// Tasks newly marked `Skipped` because of this step.
    pub newly_skipped: Vec<TaskId>,
    /// Whether this step left every task of the run in a terminal state.
    pub run_just_finished: bool,
}
