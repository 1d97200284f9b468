// src/fingerprint/hash.rs

use std::fmt::Debug;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::trace;

use crate::fs::FileSystem;

/// Content-hashing capability used by the staleness engine.
pub trait ContentHasher: Send + Sync + Debug {
    /// Hex digest of the file's current content.
    fn digest(&self, path: &Path) -> Result<String>;
}

/// Streaming BLAKE3 over a [`FileSystem`].
#[derive(Debug, Clone)]
pub struct Blake3Hasher {
    fs: Arc<dyn FileSystem>,
}

impl Blake3Hasher {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

impl ContentHasher for Blake3Hasher {
    fn digest(&self, path: &Path) -> Result<String> {
        compute_file_hash(self.fs.as_ref(), path)
    }
}

/// Compute the hash of a single file.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("reading file for hashing: {:?}", path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let digest = hasher.finalize().to_hex().to_string();
    trace!(path = ?path, digest = %digest, "hashed file");
    Ok(digest)
}
