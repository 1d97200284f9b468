// src/dag/mod.rs

//! Task graph and per-run scheduling state.
//!
//! - [`graph`] holds the task graph: tasks, the files connecting them, and
//!   the static, dynamic and ordering edges between them.
//! - [`task_info`] provides task declarations, graph nodes and the payload
//!   handed to the executor.
//! - [`scheduler`] contains the per-run state machine that decides which
//!   tasks are ready and how failures propagate.
//! - [`state_manager`] manages per-run state transitions.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`path_utils`] normalises paths.

pub mod graph;
pub mod path_utils;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;

pub use graph::BuildGraph;
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use task_info::{EnvSpec, RunState, ScheduledTask, TaskDeclaration, TaskNode, TaskRef};
