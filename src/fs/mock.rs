// src/fs/mock.rs

use super::{FileMeta, FileSystem};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
struct MockFile {
    content: Vec<u8>,
    modified: SystemTime,
}

/// In-memory filesystem with a logical clock.
///
/// Every write (and every [`touch`](MockFileSystem::touch)) advances the clock
/// by one second, so modification times are strictly increasing and tests
/// can tell "rewritten with identical content" apart from "untouched".
/// Clones share the same underlying files.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockFile>>>,
    clock: Arc<AtomicU64>,
    reads: Arc<AtomicU64>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> MutexGuard<'_, HashMap<PathBuf, MockFile>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tick(&self) -> SystemTime {
        let t = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        SystemTime::UNIX_EPOCH + Duration::from_secs(t)
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let modified = self.tick();
        self.files().insert(
            path.as_ref().to_path_buf(),
            MockFile {
                content: content.into(),
                modified,
            },
        );
    }

    /// Bump the modification time without changing the content.
    pub fn touch(&self, path: impl AsRef<Path>) {
        let modified = self.tick();
        if let Some(file) = self.files().get_mut(path.as_ref()) {
            file.modified = modified;
        }
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        self.files().remove(path.as_ref());
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.files().get(path.as_ref()).map(|f| f.content.clone())
    }

    /// Number of times a file body was opened for reading (hashing included).
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.files().get(path) {
            Some(file) => String::from_utf8(file.content.clone())
                .map_err(|e| anyhow!("Invalid UTF-8: {}", e)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.files().get(path) {
            Some(file) => Ok(Box::new(Cursor::new(file.content.clone()))),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files().contains_key(path)
    }

    fn metadata(&self, path: &Path) -> Result<Option<FileMeta>> {
        Ok(self.files().get(path).map(|file| FileMeta {
            len: file.content.len() as u64,
            modified: Some(file.modified),
        }))
    }
}
