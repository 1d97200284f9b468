#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use taskforge::config::{ConfigFile, ConfigSection, EnvEntry, InputEntry, RawConfigFile, TaskConfig};
use taskforge::dag::{EnvSpec, TaskDeclaration, TaskRef};
use taskforge::types::FailurePolicy;

/// Builder for `TaskDeclaration`.
///
/// The default command is `["tool", <primary target>]`, which is all the
/// fake executor needs.
pub struct TaskBuilder {
    decl: TaskDeclaration,
}

impl TaskBuilder {
    pub fn new(targets: &[&str]) -> Self {
        let primary = targets.first().copied().unwrap_or_default();
        Self {
            decl: TaskDeclaration {
                targets: targets.iter().map(PathBuf::from).collect(),
                command: vec!["tool".to_string(), primary.to_string()],
                ..TaskDeclaration::default()
            },
        }
    }

    pub fn input(mut self, path: &str) -> Self {
        self.decl.inputs.push(PathBuf::from(path));
        self
    }

    pub fn inputs(mut self, paths: &[&str]) -> Self {
        self.decl.inputs.extend(paths.iter().map(PathBuf::from));
        self
    }

    pub fn optional_input(mut self, path: &str) -> Self {
        self.decl.optional_inputs.push(PathBuf::from(path));
        self
    }

    pub fn env_inherit(mut self, name: &str) -> Self {
        self.decl.env.push(EnvSpec::Inherit(name.to_string()));
        self
    }

    pub fn env_define(mut self, name: &str, value: &str) -> Self {
        self.decl.env.push(EnvSpec::Define {
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn depends_on(mut self, task: impl Into<TaskRef>) -> Self {
        self.decl.depends_on.push(task.into());
        self
    }

    pub fn depends_on_target(mut self, path: &str) -> Self {
        self.decl.depends_on.push(TaskRef::Target(PathBuf::from(path)));
        self
    }

    pub fn not_before(mut self, task: impl Into<TaskRef>) -> Self {
        self.decl.not_before.push(task.into());
        self
    }

    pub fn cmd(mut self, argv: &[&str]) -> Self {
        self.decl.command = argv.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn depfile(mut self, path: &str) -> Self {
        self.decl.depfile = Some(PathBuf::from(path));
        self
    }

    pub fn build(self) -> TaskDeclaration {
        self.decl
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
    base_dir: PathBuf,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                task: BTreeMap::new(),
            },
            base_dir: PathBuf::new(),
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.config.config.jobs = Some(jobs);
        self
    }

    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.config.config.on_failure = policy;
        self
    }

    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config)
            .expect("Failed to build valid config from builder")
            .with_base_dir(self.base_dir)
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(targets: &[&str]) -> Self {
        let primary = targets.first().copied().unwrap_or_default();
        Self {
            task: TaskConfig {
                targets: targets.iter().map(PathBuf::from).collect(),
                inputs: vec![],
                env: vec![],
                depends_on: vec![],
                not_before: vec![],
                depfile: None,
                cmd: vec!["tool".to_string(), primary.to_string()],
            },
        }
    }

    pub fn input(mut self, path: &str) -> Self {
        self.task.inputs.push(InputEntry::Path(PathBuf::from(path)));
        self
    }

    pub fn optional_input(mut self, path: &str) -> Self {
        self.task.inputs.push(InputEntry::Table {
            path: PathBuf::from(path),
            optional: true,
        });
        self
    }

    pub fn env(mut self, name: &str) -> Self {
        self.task.env.push(EnvEntry::Inherit(name.to_string()));
        self
    }

    pub fn env_define(mut self, name: &str, value: &str) -> Self {
        self.task.env.push(EnvEntry::Define {
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn depends_on(mut self, task: &str) -> Self {
        self.task.depends_on.push(task.to_string());
        self
    }

    pub fn not_before(mut self, task: &str) -> Self {
        self.task.not_before.push(task.to_string());
        self
    }

    pub fn depfile(mut self, path: &str) -> Self {
        self.task.depfile = Some(PathBuf::from(path));
        self
    }

    pub fn cmd(mut self, argv: &[&str]) -> Self {
        self.task.cmd = argv.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
