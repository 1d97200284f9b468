// src/depfile/mod.rs

//! Dependency-list ingestion.
//!
//! A task's command may write a make-style rule file (compiler `-MMD`
//! output, for example) naming the files it actually read. Ingesting that
//! file replaces what that file contributes to the dynamic prerequisite set
//! of every task whose output it names. The replacement is wholesale: a
//! prerequisite that disappeared from the file (an `#include` removed from a
//! source) no longer applies.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::dag::BuildGraph;
use crate::errors::{GraphError, IngestError};
use crate::fs::FileSystem;
use crate::types::TaskId;

pub mod parser;

pub use parser::{parse, ParseError, ParseErrorKind, Rule};

/// Read `path`, written by `owner`, and return the prerequisites it lists,
/// grouped by the task producing each rule's target. Paths are resolved
/// against the graph root.
///
/// A generated rule file may name another task's output (`app.o: extra.h`
/// from a code generator), which gates that task too. `owner` always has an
/// entry. A missing file yields only that empty entry. Rules whose targets
/// no task produces (the phony header rules written by `-MP`) are ignored,
/// and so is a task's own output listed as its prerequisite.
pub fn read_prerequisites(
    graph: &BuildGraph,
    fs: &dyn FileSystem,
    owner: TaskId,
    path: &Path,
) -> Result<BTreeMap<TaskId, BTreeSet<PathBuf>>, IngestError> {
    graph.task(owner).ok_or(GraphError::UnknownTask(owner))?;

    let mut grouped: BTreeMap<TaskId, BTreeSet<PathBuf>> = BTreeMap::new();
    grouped.insert(owner, BTreeSet::new());

    let text = fs
        .read_optional(path)
        .map_err(|e| IngestError::Io {
            path: path.to_path_buf(),
            message: format!("{e:#}"),
        })?;

    let Some(text) = text else {
        debug!(task = %owner, path = ?path, "dependency-list file absent; no dynamic prerequisites");
        return Ok(grouped);
    };

    let rules = parse(&text).map_err(|e| IngestError::Malformed {
        path: path.to_path_buf(),
        line: e.line,
        kind: e.kind,
    })?;

    let mut matched = false;
    for rule in &rules {
        for target in &rule.targets {
            let Some(producer) = graph.producer_of(Path::new(target)) else {
                continue;
            };
            let Some(node) = graph.task(producer) else {
                continue;
            };
            matched = true;

            let entry = grouped.entry(producer).or_default();
            for prereq in &rule.prerequisites {
                let resolved = graph.resolve_path(Path::new(prereq));
                if !node.targets.contains(&resolved) {
                    entry.insert(resolved);
                }
            }
        }
    }

    if !matched && !rules.is_empty() {
        warn!(
            task = %owner,
            path = ?path,
            "dependency-list file has no rule for any declared output"
        );
    }

    Ok(grouped)
}

/// Ingest the task's dependency-list file (if it has one) into the graph.
///
/// Returns the new dynamic prerequisite set. On error, including an edge set
/// that would close a cycle, the previous set is left in place.
pub fn ingest(
    graph: &mut BuildGraph,
    fs: &dyn FileSystem,
    task: TaskId,
) -> Result<BTreeSet<PathBuf>, IngestError> {
    let depfile = graph
        .task(task)
        .ok_or(GraphError::UnknownTask(task))?
        .depfile
        .clone();

    match depfile {
        Some(path) => ingest_file(graph, fs, task, &path),
        None => Ok(BTreeSet::new()),
    }
}

/// Ingest an explicit dependency-list file written by `task`.
///
/// Every task the file names is updated together, and the prerequisites
/// listed for `task`'s own outputs are returned.
pub fn ingest_file(
    graph: &mut BuildGraph,
    fs: &dyn FileSystem,
    task: TaskId,
    path: &Path,
) -> Result<BTreeSet<PathBuf>, IngestError> {
    let path = graph.resolve_path(path);
    let contributions = read_prerequisites(graph, fs, task, &path)?;
    let own = contributions.get(&task).cloned().unwrap_or_default();

    let changed = graph.replace_dynamic_inputs_from(&path, contributions)?;

    debug!(
        task = %task,
        path = ?path,
        count = own.len(),
        changed = changed.len(),
        "ingested dependency-list file"
    );

    Ok(own)
}
