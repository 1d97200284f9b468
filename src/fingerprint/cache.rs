// src/fingerprint/cache.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::fingerprint::hash::ContentHasher;
use crate::fingerprint::{FileStamp, Mtime};
use crate::fs::FileSystem;

/// Per-run cache of file stamps.
///
/// Each file is stat'ed and (when needed) hashed at most once per run. When
/// a task rewrites its outputs the engine invalidates them so consumers see
/// the new content.
#[derive(Debug, Default)]
pub struct FileCache {
    stamps: HashMap<PathBuf, FileStamp>,
}

impl FileCache {
    pub fn new() -> Self {
        Self {
            stamps: HashMap::new(),
        }
    }

    /// Current stamp of `path`, or `None` if the file does not exist.
    ///
    /// If `previous` has the same size and modification time as the file on
    /// disk, its digest is reused instead of reading the file.
    pub fn stamp(
        &mut self,
        fs: &dyn FileSystem,
        hasher: &dyn ContentHasher,
        path: &Path,
        previous: Option<&FileStamp>,
    ) -> Result<Option<FileStamp>> {
        if let Some(stamp) = self.stamps.get(path) {
            return Ok(Some(stamp.clone()));
        }

        let Some(meta) = fs.metadata(path)? else {
            return Ok(None);
        };
        let mtime = meta.modified.and_then(Mtime::from_system_time);

        let digest = match previous {
            Some(prev) if prev.metadata_matches(meta.len, mtime) => prev.digest.clone(),
            _ => {
                debug!("cache miss: computing hash for {:?}", path);
                hasher.digest(path)?
            }
        };

        let stamp = FileStamp {
            digest,
            len: meta.len,
            mtime,
        };
        self.stamps.insert(path.to_path_buf(), stamp.clone());
        Ok(Some(stamp))
    }

    /// Invalidate the cached stamp for a file (e.g. after a task rewrote it).
    pub fn invalidate(&mut self, path: &Path) {
        if self.stamps.remove(path).is_some() {
            debug!("invalidated cache for {:?}", path);
        }
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}
