// src/env.rs

//! Environment lookup seam.

use std::collections::HashMap;
use std::fmt::Debug;

use crate::dag::task_info::EnvSpec;

/// Source of values for `Inherit` environment variables.
pub trait EnvSource: Send + Sync + Debug {
    fn var(&self, name: &str) -> Option<String>;

    /// Effective value of an env spec: the inherited value (if set) or the
    /// value fixed by the declaration.
    fn resolve(&self, spec: &EnvSpec) -> Option<String> {
        match spec {
            EnvSpec::Inherit(name) => self.var(name),
            EnvSpec::Define { value, .. } => Some(value.clone()),
        }
    }
}

/// Reads the orchestrator's own process environment.
#[derive(Debug, Clone, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed set of variables, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn unset(&mut self, name: &str) {
        self.vars.remove(name);
    }
}

impl EnvSource for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}
