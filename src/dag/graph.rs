// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::path_utils::normalize_path;
use crate::dag::task_info::{TaskDeclaration, TaskNode, TaskRef};
use crate::errors::GraphError;
use crate::types::{TaskId, TaskKey};

/// Per-file bookkeeping: who produces it and who reads it.
#[derive(Debug, Clone, Default)]
struct FileNode {
    producer: Option<TaskId>,
    static_consumers: BTreeSet<TaskId>,
    dynamic_consumers: BTreeSet<TaskId>,
}

impl FileNode {
    fn is_unreferenced(&self) -> bool {
        self.producer.is_none()
            && self.static_consumers.is_empty()
            && self.dynamic_consumers.is_empty()
    }
}

/// In-memory task graph.
///
/// Tasks are connected through the files they produce and consume (static
/// edges from declarations, dynamic edges from ingested dependency-list
/// files), through `depends_on` (data + ordering) and through `not_before`
/// (ordering only). The union of all four edge kinds is kept acyclic: every
/// mutation that would close a cycle is rejected and leaves the graph as it
/// was.
#[derive(Debug, Clone, Default)]
pub struct BuildGraph {
    root: PathBuf,
    tasks: Vec<TaskNode>,
    files: HashMap<PathBuf, FileNode>,
}

impl BuildGraph {
    /// Graph whose relative paths are taken as-is.
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph whose relative paths are resolved against `root`.
    ///
    /// Commands run with `root` as their working directory, so relative
    /// prerequisites in dependency-list files resolve the same way.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: normalize_path(&root.into()),
            ..Self::default()
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a declared path to the form stored in the graph.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        normalize_path(&self.root.join(path))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskNode> {
        self.tasks.get(id.0)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskNode> {
        self.tasks.iter()
    }

    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.iter().map(|t| t.id)
    }

    /// Task that declares `path` (resolved against the root) as an output.
    pub fn producer_of(&self, path: &Path) -> Option<TaskId> {
        let path = self.resolve_path(path);
        self.files.get(&path).and_then(|f| f.producer)
    }

    /// Add a task, returning its id.
    ///
    /// Rejects declarations whose outputs collide with another task's,
    /// whose references point at unknown tasks, or whose edges would close a
    /// cycle. On error the graph is unchanged.
    pub fn add_task(&mut self, decl: TaskDeclaration) -> Result<TaskId, GraphError> {
        let id = TaskId(self.tasks.len());

        let mut targets: Vec<PathBuf> = Vec::with_capacity(decl.targets.len());
        for target in &decl.targets {
            let target = self.resolve_path(target);
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        let primary = targets.first().cloned().ok_or(GraphError::EmptyTargets)?;

        if decl.command.is_empty() || decl.command[0].trim().is_empty() {
            return Err(GraphError::EmptyCommand(primary));
        }

        for target in &targets {
            if let Some(existing) = self.files.get(target).and_then(|f| f.producer) {
                return Err(GraphError::DuplicateOutput {
                    path: target.clone(),
                    existing,
                });
            }
        }

        let mut inputs: Vec<PathBuf> = Vec::with_capacity(decl.inputs.len());
        let mut optional_inputs: BTreeSet<PathBuf> = BTreeSet::new();
        let declared = decl
            .inputs
            .iter()
            .map(|p| (p, false))
            .chain(decl.optional_inputs.iter().map(|p| (p, true)));
        for (input, optional) in declared {
            let input = self.resolve_path(input);
            if targets.contains(&input) {
                return Err(GraphError::CycleDetected {
                    chain: vec![id, id],
                    labels: vec![primary.display().to_string(); 2],
                });
            }
            if inputs.contains(&input) {
                // listed as required too
                continue;
            }
            if optional {
                optional_inputs.insert(input.clone());
            }
            inputs.push(input);
        }

        let depends_on = self.resolve_refs(&decl.depends_on)?;
        let not_before = self.resolve_refs(&decl.not_before)?;

        let depfile = match decl.depfile {
            Some(ref explicit) => {
                let explicit = self.resolve_path(explicit);
                if !targets.contains(&explicit) {
                    return Err(GraphError::DepfileNotOutput {
                        depfile: explicit,
                        primary,
                    });
                }
                Some(explicit)
            }
            None => targets
                .iter()
                .find(|t| t.extension().is_some_and(|ext| ext == "d"))
                .cloned(),
        };

        // Edges the new task would introduce, checked before anything is
        // mutated.
        let mut extra: Vec<(usize, usize)> = Vec::new();
        for input in &inputs {
            if let Some(producer) = self.files.get(input).and_then(|f| f.producer) {
                extra.push((producer.0, id.0));
            }
        }
        for pred in depends_on.iter().chain(not_before.iter()) {
            extra.push((pred.0, id.0));
        }
        for target in &targets {
            if let Some(file) = self.files.get(target) {
                for consumer in file.static_consumers.iter().chain(file.dynamic_consumers.iter()) {
                    extra.push((id.0, consumer.0));
                }
            }
        }
        let label = primary.display().to_string();
        self.check_acyclic(&BTreeMap::new(), &extra, Some((id, label)))?;

        for target in &targets {
            self.files.entry(target.clone()).or_default().producer = Some(id);
        }
        for input in &inputs {
            self.files
                .entry(input.clone())
                .or_default()
                .static_consumers
                .insert(id);
        }
        for pred in &depends_on {
            self.tasks[pred.0].depended_on_by.insert(id);
        }
        for pred in &not_before {
            self.tasks[pred.0].ordered_before.insert(id);
        }

        debug!(
            task = %id,
            target = %primary.display(),
            inputs = inputs.len(),
            depfile = ?depfile,
            "added task to graph"
        );

        self.tasks.push(TaskNode {
            id,
            key: TaskKey::from_outputs(&targets),
            targets,
            inputs,
            optional_inputs,
            env: decl.env,
            depends_on,
            not_before,
            command: decl.command,
            depfile,
            dynamic_inputs: BTreeSet::new(),
            dynamic_sources: BTreeMap::new(),
            depended_on_by: BTreeSet::new(),
            ordered_before: BTreeSet::new(),
        });

        Ok(id)
    }

    fn resolve_refs(&self, refs: &[TaskRef]) -> Result<BTreeSet<TaskId>, GraphError> {
        let mut out = BTreeSet::new();
        for r in refs {
            let id = match r {
                TaskRef::Id(id) if id.0 < self.tasks.len() => *id,
                TaskRef::Id(_) => return Err(GraphError::UnknownDependency(r.to_string())),
                TaskRef::Target(path) => self
                    .producer_of(path)
                    .ok_or_else(|| GraphError::UnknownDependency(r.to_string()))?,
            };
            out.insert(id);
        }
        Ok(out)
    }

    /// Data predecessors: producers of static and dynamic inputs, plus
    /// `depends_on`. Staleness and failure propagate along these only.
    pub fn predecessors(&self, id: TaskId) -> BTreeSet<TaskId> {
        match self.task(id) {
            Some(node) => self.data_predecessors_with(node, &node.dynamic_inputs),
            None => BTreeSet::new(),
        }
    }

    fn data_predecessors_with(
        &self,
        node: &TaskNode,
        dynamic: &BTreeSet<PathBuf>,
    ) -> BTreeSet<TaskId> {
        let mut preds: BTreeSet<TaskId> = node
            .inputs
            .iter()
            .chain(dynamic.iter())
            .filter_map(|p| self.files.get(p).and_then(|f| f.producer))
            .filter(|p| *p != node.id)
            .collect();
        preds.extend(node.depends_on.iter().copied());
        preds
    }

    /// Ordering-only predecessors (`not_before`).
    pub fn ordering_only(&self, id: TaskId) -> BTreeSet<TaskId> {
        self.task(id)
            .map(|node| node.not_before.clone())
            .unwrap_or_default()
    }

    /// Data dependents: tasks consuming one of this task's outputs, plus
    /// tasks listing it in `depends_on`.
    pub fn dependents(&self, id: TaskId) -> BTreeSet<TaskId> {
        let Some(node) = self.task(id) else {
            return BTreeSet::new();
        };

        let mut out: BTreeSet<TaskId> = node.depended_on_by.clone();
        for target in &node.targets {
            if let Some(file) = self.files.get(target) {
                out.extend(file.static_consumers.iter().copied());
                out.extend(file.dynamic_consumers.iter().copied());
            }
        }
        out.remove(&id);
        out
    }

    /// Tasks that name this one in `not_before`.
    pub fn ordering_dependents(&self, id: TaskId) -> BTreeSet<TaskId> {
        self.task(id)
            .map(|node| node.ordered_before.clone())
            .unwrap_or_default()
    }

    /// Static inputs in declared order followed by dynamic prerequisites,
    /// without duplicates.
    pub fn resolved_inputs(&self, id: TaskId) -> Vec<PathBuf> {
        let Some(node) = self.task(id) else {
            return Vec::new();
        };
        let mut out = node.inputs.clone();
        for dynamic in &node.dynamic_inputs {
            if !out.contains(dynamic) {
                out.push(dynamic.clone());
            }
        }
        out
    }

    /// Whether `path` is a declared input of `id` that may be absent.
    pub fn is_optional_input(&self, id: TaskId, path: &Path) -> bool {
        self.task(id)
            .is_some_and(|node| node.optional_inputs.contains(path))
    }

    /// Whether `path` is a declared (static) input of `id`.
    pub fn is_static_input(&self, id: TaskId, path: &Path) -> bool {
        self.task(id)
            .map(|node| node.inputs.iter().any(|p| p == path))
            .unwrap_or(false)
    }

    /// Replace what the task's own dependency-list file contributes to its
    /// dynamic prerequisites, returning the previous dynamic set.
    ///
    /// Paths must already be resolved. The task's own outputs are dropped.
    /// Fails without mutating anything if the new edges would close a cycle.
    pub fn replace_dynamic_inputs(
        &mut self,
        id: TaskId,
        prerequisites: BTreeSet<PathBuf>,
    ) -> Result<BTreeSet<PathBuf>, GraphError> {
        let node = self.task(id).ok_or(GraphError::UnknownTask(id))?;
        // outputs are unique across tasks, so this key is never shared
        let source = node
            .depfile
            .clone()
            .unwrap_or_else(|| node.primary_target().clone());
        let previous = node.dynamic_inputs.clone();

        self.replace_dynamic_inputs_from(&source, BTreeMap::from([(id, prerequisites)]))?;
        Ok(previous)
    }

    /// Replace everything the dependency-list file `source` contributes, for
    /// every task at once.
    ///
    /// `contributions` maps each task named by the file to its prerequisites.
    /// Tasks the file contributed to before but no longer names lose that
    /// contribution. Either every task is updated or, when the combined edges
    /// would close a cycle, none is. Returns the tasks whose dynamic set
    /// changed.
    pub fn replace_dynamic_inputs_from(
        &mut self,
        source: &Path,
        mut contributions: BTreeMap<TaskId, BTreeSet<PathBuf>>,
    ) -> Result<Vec<TaskId>, GraphError> {
        for node in &self.tasks {
            if node.dynamic_sources.contains_key(source) {
                contributions.entry(node.id).or_default();
            }
        }

        let mut unions: BTreeMap<TaskId, BTreeSet<PathBuf>> = BTreeMap::new();
        let mut filtered: Vec<(TaskId, BTreeSet<PathBuf>)> = Vec::with_capacity(contributions.len());
        for (id, prerequisites) in contributions {
            let node = self.task(id).ok_or(GraphError::UnknownTask(id))?;
            let prerequisites: BTreeSet<PathBuf> = prerequisites
                .into_iter()
                .filter(|p| !node.targets.contains(p))
                .collect();

            let mut union: BTreeSet<PathBuf> = node
                .dynamic_sources
                .iter()
                .filter(|(from, _)| from.as_path() != source)
                .flat_map(|(_, set)| set.iter().cloned())
                .collect();
            union.extend(prerequisites.iter().cloned());

            if union != node.dynamic_inputs {
                unions.insert(id, union);
            }
            filtered.push((id, prerequisites));
        }

        if !unions.is_empty() {
            self.check_acyclic(&unions, &[], None)?;
        }

        for (id, prerequisites) in filtered {
            let sources = &mut self.tasks[id.0].dynamic_sources;
            if prerequisites.is_empty() {
                sources.remove(source);
            } else {
                sources.insert(source.to_path_buf(), prerequisites);
            }
        }

        let changed: Vec<TaskId> = unions.keys().copied().collect();
        for (id, union) in unions {
            self.set_dynamic_inputs(id, union);
        }
        Ok(changed)
    }

    fn set_dynamic_inputs(&mut self, id: TaskId, prerequisites: BTreeSet<PathBuf>) {
        let previous = std::mem::take(&mut self.tasks[id.0].dynamic_inputs);
        for path in &previous {
            if let Some(file) = self.files.get_mut(path) {
                file.dynamic_consumers.remove(&id);
                if file.is_unreferenced() {
                    self.files.remove(path);
                }
            }
        }
        for path in &prerequisites {
            self.files
                .entry(path.clone())
                .or_default()
                .dynamic_consumers
                .insert(id);
        }

        debug!(
            task = %id,
            before = previous.len(),
            after = prerequisites.len(),
            "replaced dynamic prerequisites"
        );

        self.tasks[id.0].dynamic_inputs = prerequisites;
    }

    /// Every task needed to produce `roots`: the roots plus their transitive
    /// data predecessors. Ordering-only predecessors are not pulled in.
    pub fn data_closure<I>(&self, roots: I) -> BTreeSet<TaskId>
    where
        I: IntoIterator<Item = TaskId>,
    {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<TaskId> = roots.into_iter().collect();

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            stack.extend(self.predecessors(id));
        }

        seen
    }

    /// All tasks in an order where every predecessor (data or ordering)
    /// comes first.
    pub fn topological_order(&self) -> Result<Vec<TaskId>, GraphError> {
        let graph = self.petgraph(&BTreeMap::new(), &[]);
        match toposort(&graph, None) {
            Ok(order) => Ok(order.into_iter().map(TaskId).collect()),
            Err(cycle) => Err(self.cycle_error(&graph, cycle.node_id(), None)),
        }
    }

    fn petgraph(
        &self,
        dynamic_overrides: &BTreeMap<TaskId, BTreeSet<PathBuf>>,
        extra: &[(usize, usize)],
    ) -> DiGraphMap<usize, ()> {
        let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();

        for node in &self.tasks {
            graph.add_node(node.id.0);

            let dynamic = dynamic_overrides.get(&node.id).unwrap_or(&node.dynamic_inputs);
            let preds = self.data_predecessors_with(node, dynamic);
            for pred in preds.iter().chain(node.not_before.iter()) {
                graph.add_edge(pred.0, node.id.0, ());
            }
        }

        for &(from, to) in extra {
            graph.add_edge(from, to, ());
        }

        graph
    }

    fn check_acyclic(
        &self,
        dynamic_overrides: &BTreeMap<TaskId, BTreeSet<PathBuf>>,
        extra: &[(usize, usize)],
        pending: Option<(TaskId, String)>,
    ) -> Result<(), GraphError> {
        let graph = self.petgraph(dynamic_overrides, extra);
        match toposort(&graph, None) {
            Ok(_order) => Ok(()),
            Err(cycle) => Err(self.cycle_error(&graph, cycle.node_id(), pending.as_ref())),
        }
    }

    /// Recover one concrete cycle through `start` by breadth-first search
    /// back to it.
    fn cycle_error(
        &self,
        graph: &DiGraphMap<usize, ()>,
        start: usize,
        pending: Option<&(TaskId, String)>,
    ) -> GraphError {
        let mut parent: HashMap<usize, usize> = HashMap::new();
        let mut queue: VecDeque<usize> = VecDeque::new();
        let mut closing: Option<usize> = None;

        queue.push_back(start);
        'search: while let Some(current) = queue.pop_front() {
            for next in graph.neighbors(current) {
                if next == start {
                    closing = Some(current);
                    break 'search;
                }
                if let std::collections::hash_map::Entry::Vacant(e) = parent.entry(next) {
                    e.insert(current);
                    queue.push_back(next);
                }
            }
        }

        let mut chain = vec![start];
        if let Some(mut node) = closing {
            let mut back = Vec::new();
            while node != start {
                back.push(node);
                node = parent[&node];
            }
            back.reverse();
            chain.extend(back);
        }
        chain.push(start);

        let chain: Vec<TaskId> = chain.into_iter().map(TaskId).collect();
        let labels = chain
            .iter()
            .map(|id| match (self.task(*id), pending) {
                (Some(node), _) => node.label(),
                (None, Some((pending_id, label))) if pending_id == id => label.clone(),
                (None, _) => id.to_string(),
            })
            .collect();

        GraphError::CycleDetected { chain, labels }
    }
}
