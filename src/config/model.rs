// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::dag::task_info::EnvSpec;
use crate::types::{default_jobs, FailurePolicy};

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// jobs = 4
/// state_dir = ".taskforge"
/// on_failure = "continue"
///
/// [task.compile]
/// targets = ["out.o", "out.d"]
/// inputs = ["src/main.c"]
/// env = ["CC", { name = "MODE", value = "release" }]
/// cmd = ["cc", "-MMD", "-MF", "out.d", "-c", "-o", "out.o", "src/main.c"]
/// ```
///
/// All sections are optional and have reasonable defaults; validation into
/// [`ConfigFile`] happens in `validate.rs`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Global behaviour config from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// All tasks from `[task.<name>]`.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration.
///
/// Only obtainable through `ConfigFile::try_from(RawConfigFile)`, so holding
/// one means every name reference resolves and the named references are
/// acyclic.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub task: BTreeMap<String, TaskConfig>,
    /// Directory relative paths are resolved against (the directory holding
    /// the configuration file).
    base_dir: PathBuf,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(config: ConfigSection, task: BTreeMap<String, TaskConfig>) -> Self {
        Self {
            config,
            task,
            base_dir: PathBuf::new(),
        }
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Worker slots: `[config].jobs`, else the host's available parallelism.
    pub fn effective_jobs(&self) -> usize {
        self.config.jobs.unwrap_or_else(default_jobs)
    }

    /// State directory resolved against the base directory.
    pub fn state_dir(&self) -> PathBuf {
        self.base_dir.join(&self.config.state_dir)
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Maximum number of commands running at once.
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Where the execution records live, relative to the config file.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// `"continue"` (default) or `"halt"`.
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".taskforge")
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            jobs: None,
            state_dir: default_state_dir(),
            on_failure: FailurePolicy::default(),
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Output files; the first is the primary target.
    pub targets: Vec<PathBuf>,

    /// Input files: a bare path, or `{ path = "...", optional = true }` for
    /// an input the command reads only when it exists.
    #[serde(default)]
    pub inputs: Vec<InputEntry>,

    /// Environment variables the command depends on.
    #[serde(default)]
    pub env: Vec<EnvEntry>,

    /// Names of tasks whose outputs this task consumes implicitly.
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Names of tasks that must finish first, without any data relationship.
    #[serde(default)]
    pub not_before: Vec<String>,

    /// Dependency-list file written by the command; defaults to the first
    /// `.d` target.
    #[serde(default)]
    pub depfile: Option<PathBuf>,

    /// Program and arguments. No shell is involved.
    pub cmd: Vec<String>,
}

/// An `inputs` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum InputEntry {
    Path(PathBuf),
    Table {
        path: PathBuf,
        #[serde(default)]
        optional: bool,
    },
}

impl InputEntry {
    pub fn path(&self) -> &PathBuf {
        match self {
            InputEntry::Path(path) | InputEntry::Table { path, .. } => path,
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, InputEntry::Table { optional: true, .. })
    }
}

/// An `env` entry: either a bare name (value inherited from the environment)
/// or a table with a fixed value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvEntry {
    Inherit(String),
    Define { name: String, value: String },
}

impl From<&EnvEntry> for EnvSpec {
    fn from(entry: &EnvEntry) -> Self {
        match entry {
            EnvEntry::Inherit(name) => EnvSpec::Inherit(name.clone()),
            EnvEntry::Define { name, value } => EnvSpec::Define {
                name: name.clone(),
                value: value.clone(),
            },
        }
    }
}
