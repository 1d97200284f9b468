// src/store/file.rs

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::errors::StoreError;
use crate::store::{ExecutionRecord, RecordDocument, RecordStore, FORMAT_VERSION, RECORDS_FILE};
use crate::types::TaskKey;

/// Stores records as one JSON document at `<state_dir>/records.json`.
///
/// The document is read once when the store is opened and rewritten on every
/// change: serialized to a temporary file in the same directory, then renamed
/// over the previous document, so a crash mid-write never leaves a truncated
/// file behind.
#[derive(Debug)]
pub struct FileRecordStore {
    state_dir: PathBuf,
    records: BTreeMap<TaskKey, ExecutionRecord>,
}

impl FileRecordStore {
    /// Open the store, loading any existing document.
    ///
    /// A document that cannot be parsed, or that has an unknown format
    /// version, is ignored with a warning: every task is then stale.
    pub fn open(state_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let state_dir = state_dir.into();
        let path = state_dir.join(RECORDS_FILE);

        let records = match fs::read_to_string(&path) {
            Ok(text) => parse_document(&path, &text),
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };

        debug!(path = ?path, records = records.len(), "opened record store");

        Ok(Self { state_dir, records })
    }

    pub fn path(&self) -> PathBuf {
        self.state_dir.join(RECORDS_FILE)
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn persist(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.state_dir)?;

        let doc = RecordDocument {
            version: FORMAT_VERSION,
            records: self.records.clone(),
        };

        let tmp = NamedTempFile::new_in(&self.state_dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, &doc)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(self.path())?;
        Ok(())
    }
}

fn parse_document(path: &Path, text: &str) -> BTreeMap<TaskKey, ExecutionRecord> {
    match serde_json::from_str::<RecordDocument>(text) {
        Ok(doc) if doc.version == FORMAT_VERSION => doc.records,
        Ok(doc) => {
            warn!(
                path = ?path,
                version = doc.version,
                expected = FORMAT_VERSION,
                "record store has unknown format version; treating every task as stale"
            );
            BTreeMap::new()
        }
        Err(err) => {
            warn!(
                path = ?path,
                error = %err,
                "record store is unreadable; treating every task as stale"
            );
            BTreeMap::new()
        }
    }
}

impl RecordStore for FileRecordStore {
    fn load(&self, key: &TaskKey) -> Result<Option<ExecutionRecord>, StoreError> {
        Ok(self.records.get(key).cloned())
    }

    fn save(&mut self, key: &TaskKey, record: ExecutionRecord) -> Result<(), StoreError> {
        self.records.insert(key.clone(), record);
        self.persist()?;
        debug!(task = %key, "stored execution record (file)");
        Ok(())
    }

    fn invalidate(&mut self, key: &TaskKey) -> Result<(), StoreError> {
        if self.records.remove(key).is_some() {
            self.persist()?;
            debug!(task = %key, "invalidated execution record (file)");
        }
        Ok(())
    }

    fn prune(&mut self, active: &[TaskKey]) -> Result<usize, StoreError> {
        let initial_len = self.records.len();
        self.records.retain(|k, _| active.contains(k));
        let removed = initial_len - self.records.len();

        if removed > 0 {
            self.persist()?;
            info!(removed, "pruned stale execution records (file)");
        }
        Ok(removed)
    }
}
