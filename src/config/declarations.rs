// src/config/declarations.rs

//! Turns a validated [`ConfigFile`] into task declarations and a graph.

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use tracing::debug;

use crate::config::model::{ConfigFile, TaskConfig};
use crate::config::validate::reference_graph;
use crate::dag::{BuildGraph, TaskDeclaration, TaskRef};
use crate::errors::{Result, TaskforgeError};
use crate::types::TaskId;

/// Build the task graph rooted at the config's base directory.
///
/// Tasks are added in a topological order of their named references, so
/// every `depends_on` / `not_before` name already has an id when it is
/// needed. Returns the graph and the id of every task name.
pub fn build_graph(cfg: &ConfigFile) -> Result<(BuildGraph, BTreeMap<String, TaskId>)> {
    let refs = reference_graph(&cfg.task);
    let order = toposort(&refs, None).map_err(|cycle| {
        TaskforgeError::ConfigError(format!(
            "cycle detected in task references involving task '{}'",
            cycle.node_id()
        ))
    })?;

    let mut graph = BuildGraph::with_root(cfg.base_dir());
    let mut ids: BTreeMap<String, TaskId> = BTreeMap::new();

    for name in order {
        let Some(task) = cfg.task.get(name) else {
            continue;
        };
        let decl = declaration_for(name, task, &ids)?;
        let id = graph.add_task(decl).map_err(|err| {
            TaskforgeError::ConfigError(format!("task '{name}': {err}"))
        })?;
        debug!(task = %name, id = %id, "declared task");
        ids.insert(name.to_string(), id);
    }

    Ok((graph, ids))
}

fn declaration_for(
    name: &str,
    task: &TaskConfig,
    ids: &BTreeMap<String, TaskId>,
) -> Result<TaskDeclaration> {
    let resolve = |dep: &String| -> Result<TaskRef> {
        ids.get(dep).copied().map(TaskRef::Id).ok_or_else(|| {
            TaskforgeError::ConfigError(format!("task '{name}' references unknown task '{dep}'"))
        })
    };

    Ok(TaskDeclaration {
        targets: task.targets.clone(),
        inputs: task
            .inputs
            .iter()
            .filter(|entry| !entry.is_optional())
            .map(|entry| entry.path().clone())
            .collect(),
        optional_inputs: task
            .inputs
            .iter()
            .filter(|entry| entry.is_optional())
            .map(|entry| entry.path().clone())
            .collect(),
        env: task.env.iter().map(Into::into).collect(),
        depends_on: task.depends_on.iter().map(resolve).collect::<Result<_>>()?,
        not_before: task.not_before.iter().map(resolve).collect::<Result<_>>()?,
        command: task.cmd.clone(),
        depfile: task.depfile.clone(),
    })
}
