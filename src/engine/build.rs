// src/engine/build.rs

//! Public entry point: one [`Build`] owns a graph, its record store and the
//! seams it reads the world through, and runs builds over them.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::dag::BuildGraph;
use crate::depfile;
use crate::engine::core::BuildCore;
use crate::engine::report::{BuildPlan, ExecutionReport, PlanAction, PlanEntry};
use crate::engine::runtime::Runtime;
use crate::engine::{RunOptions, RuntimeEvent};
use crate::env::{EnvSource, ProcessEnv};
use crate::errors::{IngestError, Result, TaskforgeError};
use crate::exec::ExecutorBackend;
use crate::fingerprint::{Blake3Hasher, ContentHasher, FileCache};
use crate::fs::{FileSystem, RealFileSystem};
use crate::stale::{StalenessEngine, Verdict};
use crate::store::RecordStore;
use crate::types::{TaskId, TaskKey};

/// Build state for one graph.
///
/// Nothing here is global: two `Build`s over different graphs and stores
/// are fully independent.
pub struct Build {
    graph: BuildGraph,
    store: Box<dyn RecordStore>,
    fs: Arc<dyn FileSystem>,
    hasher: Arc<dyn ContentHasher>,
    env: Arc<dyn EnvSource>,
    options: RunOptions,
}

impl std::fmt::Debug for Build {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Build")
            .field("tasks", &self.graph.len())
            .field("store", &self.store)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Build {
    /// Build over the real filesystem and process environment.
    pub fn new(graph: BuildGraph, store: Box<dyn RecordStore>) -> Self {
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        Self {
            graph,
            store,
            hasher: Arc::new(Blake3Hasher::new(Arc::clone(&fs))),
            fs,
            env: Arc::new(ProcessEnv),
            options: RunOptions::default(),
        }
    }

    /// Read files through `fs`; content hashing follows.
    pub fn with_filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.hasher = Arc::new(Blake3Hasher::new(Arc::clone(&fs)));
        self.fs = fs;
        self
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_env(mut self, env: Arc<dyn EnvSource>) -> Self {
        self.env = env;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn graph(&self) -> &BuildGraph {
        &self.graph
    }

    /// Bring every task up to date.
    ///
    /// `make_executor` receives the sender on which the executor must report
    /// completions; `RealExecutorBackend::new` fits directly. Records of
    /// tasks that are no longer declared are pruned afterwards.
    pub async fn build_all<E, F>(&mut self, make_executor: F) -> Result<ExecutionReport>
    where
        E: ExecutorBackend,
        F: FnOnce(mpsc::Sender<RuntimeEvent>) -> E,
    {
        let ingest_errors = self.ingest_all();
        let selection: BTreeSet<TaskId> = self.graph.task_ids().collect();

        let report = self.run(selection, ingest_errors, make_executor).await?;
        self.prune_records();
        Ok(report)
    }

    /// Bring one target up to date, running only the tasks it transitively
    /// needs through data edges.
    pub async fn build_target<E, F>(
        &mut self,
        target: impl AsRef<Path>,
        make_executor: F,
    ) -> Result<ExecutionReport>
    where
        E: ExecutorBackend,
        F: FnOnce(mpsc::Sender<RuntimeEvent>) -> E,
    {
        let ingest_errors = self.ingest_all();
        let selection = self.target_selection(target.as_ref())?;

        self.run(selection, ingest_errors, make_executor).await
    }

    /// What `build_all` would do, without running anything.
    pub fn plan(&mut self) -> Result<BuildPlan> {
        let ingest_errors = self.ingest_all();
        let selection: BTreeSet<TaskId> = self.graph.task_ids().collect();
        self.plan_selection(&selection, ingest_errors)
    }

    /// What `build_target` would do, without running anything.
    pub fn plan_target(&mut self, target: impl AsRef<Path>) -> Result<BuildPlan> {
        let ingest_errors = self.ingest_all();
        let selection = self.target_selection(target.as_ref())?;
        self.plan_selection(&selection, ingest_errors)
    }

    fn target_selection(&self, target: &Path) -> Result<BTreeSet<TaskId>> {
        let producer = self
            .graph
            .producer_of(target)
            .ok_or_else(|| TaskforgeError::TaskNotFound(target.display().to_string()))?;
        Ok(self.graph.data_closure([producer]))
    }

    /// Ingest every existing dependency-list file before the run.
    fn ingest_all(&mut self) -> HashMap<TaskId, IngestError> {
        let ids: Vec<TaskId> = self.graph.task_ids().collect();
        let mut errors = HashMap::new();

        for id in ids {
            if let Err(err) = depfile::ingest(&mut self.graph, self.fs.as_ref(), id) {
                warn!(task = %id, error = %err, "could not ingest dependency-list file");
                errors.insert(id, err);
            }
        }

        errors
    }

    async fn run<E, F>(
        &mut self,
        selection: BTreeSet<TaskId>,
        ingest_errors: HashMap<TaskId, IngestError>,
        make_executor: F,
    ) -> Result<ExecutionReport>
    where
        E: ExecutorBackend,
        F: FnOnce(mpsc::Sender<RuntimeEvent>) -> E,
    {
        // At most `jobs` completions are ever outstanding.
        let (tx, rx) = mpsc::channel::<RuntimeEvent>(self.options.jobs.max(1) + 16);
        let executor = make_executor(tx);

        let mut core = BuildCore::new(
            &mut self.graph,
            self.store.as_mut(),
            self.fs.as_ref(),
            self.hasher.as_ref(),
            self.env.as_ref(),
            self.options,
        );
        core.set_ingest_errors(ingest_errors);

        let report = Runtime::new(core, rx, executor).run(selection).await?;

        info!(
            ran = report.ran().len(),
            fresh = report.fresh().len(),
            failed = report.failed().len(),
            skipped = report.skipped().len(),
            "build finished"
        );
        Ok(report)
    }

    fn plan_selection(
        &mut self,
        selection: &BTreeSet<TaskId>,
        mut ingest_errors: HashMap<TaskId, IngestError>,
    ) -> Result<BuildPlan> {
        let order = self.graph.topological_order()?;

        let mut cache = FileCache::new();
        let mut rebuilt = HashSet::new();
        // failing task -> root failure it stems from
        let mut failing: HashMap<TaskId, TaskId> = HashMap::new();
        let mut entries = Vec::new();

        for id in order.into_iter().filter(|id| selection.contains(id)) {
            let Some(node) = self.graph.task(id) else {
                continue;
            };
            let label = node.label();

            let upstream_failure = self
                .graph
                .predecessors(id)
                .iter()
                .find_map(|pred| failing.get(pred).copied());

            let action = if let Some(cause) = upstream_failure {
                PlanAction::Skip { cause }
            } else if let Some(err) = ingest_errors.remove(&id) {
                PlanAction::Fail(err.into())
            } else {
                let record = self.store.load(&node.key).unwrap_or_else(|err| {
                    warn!(task = %node.key, error = %err, "could not load execution record");
                    None
                });
                let mut engine = StalenessEngine::new(
                    &self.graph,
                    self.fs.as_ref(),
                    self.hasher.as_ref(),
                    self.env.as_ref(),
                    &mut cache,
                );
                match engine.evaluate(id, record.as_ref(), &rebuilt) {
                    Ok(Verdict::Fresh) => PlanAction::UpToDate,
                    Ok(Verdict::Stale(reason)) => {
                        rebuilt.extend(node.targets.iter().cloned());
                        PlanAction::Run(reason)
                    }
                    Err(err) => PlanAction::Fail(err),
                }
            };

            match &action {
                PlanAction::Skip { cause } => {
                    failing.insert(id, *cause);
                }
                PlanAction::Fail(_) => {
                    failing.insert(id, id);
                }
                _ => {}
            }

            entries.push(PlanEntry { id, label, action });
        }

        Ok(BuildPlan { entries })
    }

    fn prune_records(&mut self) {
        let active: Vec<TaskKey> = self.graph.tasks().map(|n| n.key.clone()).collect();
        match self.store.prune(&active) {
            Ok(0) => {}
            Ok(removed) => info!(removed, "pruned records of tasks no longer declared"),
            Err(err) => warn!(error = %err, "could not prune execution records"),
        }
    }
}
