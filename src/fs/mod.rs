// src/fs/mod.rs

//! Filesystem seam.
//!
//! The staleness engine, the dependency-list ingestor and the content hasher
//! only talk to the disk through [`FileSystem`], so the whole decision engine
//! can be exercised against [`mock::MockFileSystem`] in tests.

use std::fmt::Debug;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};

pub mod mock;

/// The parts of a file's metadata the staleness engine cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub len: u64,
    /// `None` when the platform cannot report a modification time.
    pub modified: Option<SystemTime>,
}

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>>;
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;

    /// Metadata of a regular file, or `None` if nothing exists at `path`.
    fn metadata(&self, path: &Path) -> Result<Option<FileMeta>>;

    /// Read a file that may legitimately be absent.
    fn read_optional(&self, path: &Path) -> Result<Option<String>> {
        if !self.exists(path) {
            return Ok(None);
        }
        self.read_to_string(path).map(Some)
    }
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("reading file {:?}", path))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let file = fs::File::open(path).with_context(|| format!("opening file {:?}", path))?;
        Ok(Box::new(file))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
            }
        }
        let mut file = fs::File::create(path).with_context(|| format!("creating file {:?}", path))?;
        file.write_all(contents).with_context(|| format!("writing to file {:?}", path))?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn metadata(&self, path: &Path) -> Result<Option<FileMeta>> {
        match fs::metadata(path) {
            Ok(md) => Ok(Some(FileMeta {
                len: md.len(),
                modified: md.modified().ok(),
            })),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("reading metadata of {:?}", path)),
        }
    }

    fn read_optional(&self, path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(s) => Ok(Some(s)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("reading file {:?}", path)),
        }
    }
}
