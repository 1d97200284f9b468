// src/store/mod.rs

//! Execution record store.
//!
//! One record per task, keyed by [`TaskKey`], written only after the task
//! ran successfully. The staleness engine compares the current state of a
//! task against its record; no record means "never built".

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::StoreError;
use crate::fingerprint::FileStamp;
use crate::types::TaskKey;

pub mod file;
pub mod memory;

pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;

/// File name of the record document inside the state directory.
pub const RECORDS_FILE: &str = "records.json";

/// Current on-disk format version. Documents with any other version are
/// ignored.
pub const FORMAT_VERSION: u32 = 1;

/// What was true about a task the last time it ran successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub command: Vec<String>,
    /// Effective value of every env var the task depends on; `None` if the
    /// variable was unset.
    #[serde(default)]
    pub env: BTreeMap<String, Option<String>>,
    /// Every resolved input (static and dynamic) with its stamp.
    #[serde(default)]
    pub inputs: BTreeMap<PathBuf, FileStamp>,
    #[serde(default)]
    pub outputs: Vec<PathBuf>,
}

/// Abstract storage for execution records.
pub trait RecordStore: Send + Debug {
    fn load(&self, key: &TaskKey) -> Result<Option<ExecutionRecord>, StoreError>;
    fn save(&mut self, key: &TaskKey, record: ExecutionRecord) -> Result<(), StoreError>;
    /// Forget the record so the task is treated as never built.
    fn invalidate(&mut self, key: &TaskKey) -> Result<(), StoreError>;
    /// Remove records for tasks that are not in `active`. Returns how many
    /// were dropped.
    fn prune(&mut self, active: &[TaskKey]) -> Result<usize, StoreError>;
}

/// Serialized form of the whole store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct RecordDocument {
    pub version: u32,
    #[serde(default)]
    pub records: BTreeMap<TaskKey, ExecutionRecord>,
}
