// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - unknown `depends_on` / `not_before` references,
///   - cycles among those references,
///   - empty targets or commands,
///   - basic global config sanity.
///
/// Relative paths in the result resolve against the directory holding the
/// file.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config.with_base_dir(config_root_dir(path.as_ref())?))
}

/// Parse and validate configuration text. Relative paths resolve against
/// `base_dir`.
pub fn parse_and_validate(contents: &str, base_dir: impl Into<PathBuf>) -> Result<ConfigFile> {
    let raw_config: RawConfigFile = toml::from_str(contents)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config.with_base_dir(base_dir))
}

/// Absolute directory holding the config file.
///
/// A bare file name like `Taskforge.toml` (parent = "") resolves to the
/// current working directory.
fn config_root_dir(config_path: &Path) -> Result<PathBuf> {
    let parent = match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok(std::path::absolute(parent)?)
}
