// src/errors.rs

//! Crate-wide error types.
//!
//! Each layer has its own `thiserror` enum so callers can match on the
//! failure class (`GraphError` aborts before anything runs, `IngestError`
//! and `ExecutionError` only fail the owning task, `StoreError` is a
//! warning). [`TaskforgeError`] collects them for the application edge.

use std::path::PathBuf;

use thiserror::Error;

use crate::depfile::ParseErrorKind;
use crate::types::TaskId;

/// Structural problems in the task graph. Always fatal before execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("output {path:?} is already produced by task {existing}")]
    DuplicateOutput { path: PathBuf, existing: TaskId },

    #[error("unknown dependency reference: {0}")]
    UnknownDependency(String),

    #[error("cycle detected in task graph: {}", labels.join(" -> "))]
    CycleDetected {
        chain: Vec<TaskId>,
        labels: Vec<String>,
    },

    #[error("task declares no targets")]
    EmptyTargets,

    #[error("task producing {0:?} declares an empty command")]
    EmptyCommand(PathBuf),

    #[error("dependency-list file {depfile:?} is not a declared target of the task producing {primary:?}")]
    DepfileNotOutput { depfile: PathBuf, primary: PathBuf },

    #[error("unknown task id {0}")]
    UnknownTask(TaskId),
}

/// Failure to read or apply a dependency-list file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("{}:{line}: {kind}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        kind: ParseErrorKind,
    },

    #[error("reading dependency-list file {path:?}: {message}")]
    Io { path: PathBuf, message: String },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Why a task was reported as failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("command exited with {}", describe_exit(*code))]
    NonZeroExit {
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("failed to spawn command: {0}")]
    Spawn(String),

    #[error("declared output {0:?} missing after the command succeeded")]
    MissingOutput(PathBuf),

    #[error("input {0:?} does not exist and no task produces it")]
    MissingInput(PathBuf),

    #[error("could not fingerprint {path:?}: {message}")]
    Fingerprint { path: PathBuf, message: String },

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

/// Persistence failures of the execution record store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record store encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("replacing record store file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

#[derive(Error, Debug)]
pub enum TaskforgeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskforgeError>;
