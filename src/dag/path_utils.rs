// src/dag/path_utils.rs

//! Lexical path handling for graph keys.

use std::path::{Component, Path, PathBuf};

/// Lexically normalise a path: drop `.` components and fold `dir/..`.
///
/// The filesystem is never consulted, so symlinks are not resolved. Leading
/// `..` components of relative paths are kept.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_parent = matches!(out.components().next_back(), Some(Component::ParentDir));
                let at_root = matches!(
                    out.components().next_back(),
                    Some(Component::RootDir) | Some(Component::Prefix(_))
                );
                if out.as_os_str().is_empty() || last_is_parent {
                    out.push("..");
                } else if !at_root {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }

    out
}
