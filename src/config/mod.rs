// src/config/mod.rs

//! Configuration loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate basic invariants like reference correctness (`validate.rs`).
//! - Turn the validated config into a task graph (`declarations.rs`).

pub mod declarations;
pub mod loader;
pub mod model;
pub mod validate;

pub use declarations::build_graph;
pub use loader::{load_and_validate, load_from_path, parse_and_validate};
pub use model::{ConfigFile, ConfigSection, EnvEntry, InputEntry, RawConfigFile, TaskConfig};
