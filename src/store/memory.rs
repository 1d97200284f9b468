// src/store/memory.rs

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::errors::StoreError;
use crate::store::{ExecutionRecord, RecordStore};
use crate::types::TaskKey;

/// Stores records in memory only. Clones share the same records.
///
/// [`fail_writes`](MemoryRecordStore::fail_writes) makes every `save` fail,
/// which is how tests exercise the "record could not be persisted" path.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    map: Arc<Mutex<HashMap<TaskKey, ExecutionRecord>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<TaskKey, ExecutionRecord>> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    pub fn keys(&self) -> Vec<TaskKey> {
        let mut keys: Vec<TaskKey> = self.map().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn get(&self, key: &TaskKey) -> Option<ExecutionRecord> {
        self.map().get(key).cloned()
    }
}

impl RecordStore for MemoryRecordStore {
    fn load(&self, key: &TaskKey) -> Result<Option<ExecutionRecord>, StoreError> {
        Ok(self.get(key))
    }

    fn save(&mut self, key: &TaskKey, record: ExecutionRecord) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Io(io::Error::other("record store writes disabled")));
        }
        self.map().insert(key.clone(), record);
        debug!(task = %key, "stored execution record (memory)");
        Ok(())
    }

    fn invalidate(&mut self, key: &TaskKey) -> Result<(), StoreError> {
        self.map().remove(key);
        Ok(())
    }

    fn prune(&mut self, active: &[TaskKey]) -> Result<usize, StoreError> {
        let mut map = self.map();
        let initial_len = map.len();
        map.retain(|k, _| active.contains(k));
        let removed = initial_len - map.len();
        if removed > 0 {
            info!(removed, "pruned stale execution records (memory)");
        }
        Ok(removed)
    }
}
