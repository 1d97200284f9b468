// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - the per-run scheduler and the bounded slot queue
//! - the staleness engine and the record store
//! - the main runtime event loop that reacts to task completion events
//!
//! The synchronous coordinator lives in [`core`] (with the event handlers
//! in [`event_handlers`]); the async/IO shell is implemented in
//! [`runtime`]. [`build`] is the public entry point.

use std::time::Duration;

use crate::errors::ExecutionError;
use crate::types::{FailurePolicy, TaskId};

/// What happened when the executor ran one task's command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    /// `Ok` when the command exited with status zero.
    pub status: Result<(), ExecutionError>,
    pub duration: Duration,
}

impl TaskResult {
    pub fn success(duration: Duration) -> Self {
        Self {
            status: Ok(()),
            duration,
        }
    }

    pub fn failure(err: ExecutionError, duration: Duration) -> Self {
        Self {
            status: Err(err),
            duration,
        }
    }
}

/// Events flowing into the runtime from the executor.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A dispatched task's command finished (or could not be started).
    TaskCompleted { task: TaskId, result: TaskResult },
}

/// Options for one build run.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Maximum number of commands running at once.
    pub jobs: usize,
    pub on_failure: FailurePolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            jobs: crate::types::default_jobs(),
            on_failure: FailurePolicy::default(),
        }
    }
}

pub mod build;
pub mod core;
pub mod event_handlers;
pub mod queue;
pub mod report;
pub mod runtime;

pub use build::Build;
pub use core::BuildCore;
pub use event_handlers::{CoreCommand, CoreStep};
pub use queue::SlotQueue;
pub use report::{BuildPlan, ExecutionReport, Outcome, PlanAction, PlanEntry, TaskReport};
pub use runtime::Runtime;
