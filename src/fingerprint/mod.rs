// src/fingerprint/mod.rs

//! File fingerprints.
//!
//! A [`FileStamp`] is what the execution record remembers about an input:
//! its content digest plus the size and modification time observed when the
//! digest was taken. The size/mtime pair is only a shortcut; the digest is
//! the source of truth.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub mod cache;
pub mod hash;

pub use cache::FileCache;
pub use hash::{compute_file_hash, Blake3Hasher, ContentHasher};

/// Modification time with nanosecond resolution, relative to the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mtime {
    pub secs: u64,
    pub nanos: u32,
}

impl Mtime {
    /// `None` for times before the epoch, which cannot be stored.
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        let since = time.duration_since(UNIX_EPOCH).ok()?;
        Some(Self {
            secs: since.as_secs(),
            nanos: since.subsec_nanos(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStamp {
    /// Hex-encoded content digest.
    pub digest: String,
    pub len: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<Mtime>,
}

impl FileStamp {
    /// Whether `len`/`mtime` are identical to this stamp's, so the recorded
    /// digest can be trusted without reading the file.
    ///
    /// Never true when either side lacks a modification time.
    pub fn metadata_matches(&self, len: u64, mtime: Option<Mtime>) -> bool {
        match (self.mtime, mtime) {
            (Some(recorded), Some(current)) => recorded == current && self.len == len,
            _ => false,
        }
    }
}
