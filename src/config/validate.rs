// src/config/validate.rs

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile, TaskConfig};
use crate::errors::{Result, TaskforgeError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TaskforgeError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_tasks(cfg)?;
    validate_task_references(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(TaskforgeError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.jobs == Some(0) {
        return Err(TaskforgeError::ConfigError(
            "[config].jobs must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_tasks(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if task.targets.is_empty() {
            return Err(TaskforgeError::ConfigError(format!(
                "task '{name}' must declare at least one target"
            )));
        }
        if task.cmd.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(TaskforgeError::ConfigError(format!(
                "task '{name}' has an empty `cmd`"
            )));
        }
    }
    Ok(())
}

fn validate_task_references(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        let refs = task
            .depends_on
            .iter()
            .map(|d| ("depends_on", d))
            .chain(task.not_before.iter().map(|d| ("not_before", d)));

        for (field, dep) in refs {
            if !cfg.task.contains_key(dep) {
                return Err(TaskforgeError::ConfigError(format!(
                    "task '{name}' has unknown dependency '{dep}' in `{field}`"
                )));
            }
            if dep == name {
                return Err(TaskforgeError::ConfigError(format!(
                    "task '{name}' cannot reference itself in `{field}`"
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: referenced task -> referencing task.
    toposort(&reference_graph(&cfg.task), None)
        .map(|_order| ())
        .map_err(|cycle| {
            TaskforgeError::ConfigError(format!(
                "cycle detected in task references involving task '{}'",
                cycle.node_id()
            ))
        })
}

/// Graph of the named references (`depends_on` and `not_before`) between
/// tasks.
pub(crate) fn reference_graph(tasks: &BTreeMap<String, TaskConfig>) -> DiGraphMap<&str, ()> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in tasks.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in tasks.iter() {
        for dep in task.depends_on.iter().chain(task.not_before.iter()) {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    graph
}
