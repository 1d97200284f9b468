// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running task commands, using
//! `tokio::process::Command`, and reporting back to the build runtime via
//! `RuntimeEvent`s.
//!
//! - [`executor_loop`] owns the background loop that receives scheduled
//!   tasks and spawns one runner per task.
//! - [`task_runner`] runs a single command: program lookup, environment,
//!   output capture, exit status and duration.
//! - [`backend`] provides the `ExecutorBackend` trait and the concrete
//!   `RealExecutorBackend` used in production, which tests replace with a
//!   fake implementation.

pub mod backend;
pub mod executor_loop;
pub mod task_runner;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use executor_loop::spawn_executor;
