// tests/staleness.rs

mod common;
use crate::common::builders::TaskBuilder;
use crate::common::init_tracing;

use std::collections::{BTreeSet, HashSet};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use taskforge::dag::{BuildGraph, TaskDeclaration};
use taskforge::env::MapEnv;
use taskforge::errors::ExecutionError;
use taskforge::fingerprint::{Blake3Hasher, FileCache};
use taskforge::fs::mock::MockFileSystem;
use taskforge::stale::{StaleReason, StalenessEngine, Verdict};
use taskforge::store::ExecutionRecord;
use taskforge::types::TaskId;

type TestResult = Result<(), Box<dyn Error>>;

/// One task over a mock filesystem, evaluated with a fresh cache each time
/// (as a new run would).
struct Harness {
    fs: MockFileSystem,
    hasher: Blake3Hasher,
    env: MapEnv,
    graph: BuildGraph,
    id: TaskId,
}

impl Harness {
    fn new(decl: TaskDeclaration) -> Result<Self, Box<dyn Error>> {
        init_tracing();
        let fs = MockFileSystem::new();
        let mut graph = BuildGraph::new();
        let id = graph.add_task(decl)?;
        Ok(Self {
            hasher: Blake3Hasher::new(Arc::new(fs.clone())),
            fs,
            env: MapEnv::new(),
            graph,
            id,
        })
    }

    fn evaluate(
        &self,
        record: Option<&ExecutionRecord>,
        rebuilt: &HashSet<PathBuf>,
    ) -> Result<Verdict, ExecutionError> {
        let mut cache = FileCache::new();
        StalenessEngine::new(&self.graph, &self.fs, &self.hasher, &self.env, &mut cache)
            .evaluate(self.id, record, rebuilt)
    }

    fn verdict(&self, record: &ExecutionRecord) -> Result<Verdict, ExecutionError> {
        self.evaluate(Some(record), &HashSet::new())
    }

    fn snapshot(&self) -> Result<ExecutionRecord, ExecutionError> {
        let mut cache = FileCache::new();
        StalenessEngine::new(&self.graph, &self.fs, &self.hasher, &self.env, &mut cache)
            .snapshot(self.id)
    }
}

fn compile_task() -> TaskDeclaration {
    TaskBuilder::new(&["a.o"])
        .input("a.c")
        .env_inherit("CC")
        .cmd(&["cc", "-c", "a.c", "-o", "a.o"])
        .build()
}

/// Harness where `a.o` was built from `a.c` and the record matches.
fn built() -> Result<(Harness, ExecutionRecord), Box<dyn Error>> {
    let harness = Harness::new(compile_task())?;
    harness.fs.add_file("a.c", "int main() {}");
    harness.fs.add_file("a.o", "object");
    let record = harness.snapshot()?;
    Ok((harness, record))
}

fn stale(reason: StaleReason) -> Verdict {
    Verdict::Stale(reason)
}

#[test]
fn never_built_task_is_stale() -> TestResult {
    let harness = Harness::new(compile_task())?;
    harness.fs.add_file("a.c", "x");

    let verdict = harness.evaluate(None, &HashSet::new())?;
    assert_eq!(verdict, stale(StaleReason::NoRecord));
    Ok(())
}

#[test]
fn unchanged_task_is_fresh() -> TestResult {
    let (harness, record) = built()?;
    assert_eq!(harness.verdict(&record)?, Verdict::Fresh);
    Ok(())
}

#[test]
fn missing_output_makes_task_stale() -> TestResult {
    let (harness, record) = built()?;
    harness.fs.remove("a.o");

    assert_eq!(
        harness.verdict(&record)?,
        stale(StaleReason::OutputMissing(PathBuf::from("a.o")))
    );
    Ok(())
}

#[test]
fn changed_command_makes_task_stale() -> TestResult {
    let (harness, mut record) = built()?;
    record.command.push("-O2".to_string());

    assert_eq!(harness.verdict(&record)?, stale(StaleReason::CommandChanged));
    Ok(())
}

#[test]
fn changed_or_unset_env_var_makes_task_stale() -> TestResult {
    let (mut harness, _) = built()?;
    harness.env.set("CC", "gcc");
    let record = harness.snapshot()?;
    assert_eq!(harness.verdict(&record)?, Verdict::Fresh);

    harness.env.set("CC", "clang");
    assert_eq!(
        harness.verdict(&record)?,
        stale(StaleReason::EnvChanged("CC".to_string()))
    );

    harness.env.unset("CC");
    assert_eq!(
        harness.verdict(&record)?,
        stale(StaleReason::EnvChanged("CC".to_string()))
    );
    Ok(())
}

#[test]
fn env_var_no_longer_declared_makes_task_stale() -> TestResult {
    let (harness, mut record) = built()?;
    record
        .env
        .insert("OLD_FLAG".to_string(), Some("1".to_string()));

    assert_eq!(
        harness.verdict(&record)?,
        stale(StaleReason::EnvChanged("OLD_FLAG".to_string()))
    );
    Ok(())
}

#[test]
fn input_rebuilt_in_this_run_makes_task_stale() -> TestResult {
    let (harness, record) = built()?;
    let rebuilt = HashSet::from([PathBuf::from("a.c")]);

    assert_eq!(
        harness.evaluate(Some(&record), &rebuilt)?,
        stale(StaleReason::InputRebuilt(PathBuf::from("a.c")))
    );
    Ok(())
}

#[test]
fn input_set_changes_make_task_stale() -> TestResult {
    let (mut harness, record) = built()?;

    harness.fs.add_file("a.h", "#define X");
    harness
        .graph
        .replace_dynamic_inputs(harness.id, BTreeSet::from([PathBuf::from("a.h")]))?;
    assert_eq!(
        harness.verdict(&record)?,
        stale(StaleReason::InputAdded(PathBuf::from("a.h")))
    );

    let with_header = harness.snapshot()?;
    harness
        .graph
        .replace_dynamic_inputs(harness.id, BTreeSet::new())?;
    assert_eq!(
        harness.verdict(&with_header)?,
        stale(StaleReason::InputRemoved(PathBuf::from("a.h")))
    );
    Ok(())
}

#[test]
fn edited_input_makes_task_stale() -> TestResult {
    let (harness, record) = built()?;
    harness.fs.add_file("a.c", "int main() { return 1; }");

    assert_eq!(
        harness.verdict(&record)?,
        stale(StaleReason::InputChanged(PathBuf::from("a.c")))
    );
    Ok(())
}

#[test]
fn touched_but_identical_input_stays_fresh() -> TestResult {
    let (harness, record) = built()?;
    harness.fs.touch("a.c");

    assert_eq!(harness.verdict(&record)?, Verdict::Fresh);
    Ok(())
}

#[test]
fn matching_size_and_mtime_skip_reading_the_file() -> TestResult {
    let (harness, record) = built()?;

    let before = harness.fs.read_count();
    assert_eq!(harness.verdict(&record)?, Verdict::Fresh);
    assert_eq!(harness.fs.read_count(), before);

    harness.fs.touch("a.c");
    assert_eq!(harness.verdict(&record)?, Verdict::Fresh);
    assert!(harness.fs.read_count() > before);
    Ok(())
}

#[test]
fn missing_source_is_an_error_not_a_reason() -> TestResult {
    let harness = Harness::new(compile_task())?;

    let err = harness.evaluate(None, &HashSet::new()).unwrap_err();
    assert_eq!(err, ExecutionError::MissingInput(PathBuf::from("a.c")));
    Ok(())
}

#[test]
fn missing_input_with_a_producer_is_not_an_error() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let hasher = Blake3Hasher::new(Arc::new(fs.clone()));
    let env = MapEnv::new();
    let mut graph = BuildGraph::new();
    graph.add_task(TaskBuilder::new(&["gen.c"]).build())?;
    let consumer = graph.add_task(TaskBuilder::new(&["gen.o"]).input("gen.c").build())?;

    let mut cache = FileCache::new();
    let verdict = StalenessEngine::new(&graph, &fs, &hasher, &env, &mut cache).evaluate(
        consumer,
        None,
        &HashSet::new(),
    )?;

    assert_eq!(verdict, stale(StaleReason::NoRecord));
    Ok(())
}

#[test]
fn vanished_discovered_prerequisite_makes_task_stale() -> TestResult {
    let (mut harness, _) = built()?;
    harness.fs.add_file("a.h", "#define X");
    harness
        .graph
        .replace_dynamic_inputs(harness.id, BTreeSet::from([PathBuf::from("a.h")]))?;
    let record = harness.snapshot()?;

    harness.fs.remove("a.h");
    assert_eq!(
        harness.verdict(&record)?,
        stale(StaleReason::InputMissing(PathBuf::from("a.h")))
    );

    // Snapshots skip it instead of failing.
    let snapshot = harness.snapshot()?;
    assert!(!snapshot.inputs.contains_key(&PathBuf::from("a.h")));
    Ok(())
}

#[test]
fn snapshot_records_command_env_inputs_and_outputs() -> TestResult {
    let (mut harness, _) = built()?;
    harness.env.set("CC", "gcc");
    let record = harness.snapshot()?;

    assert_eq!(record.command, vec!["cc", "-c", "a.c", "-o", "a.o"]);
    assert_eq!(record.env.get("CC"), Some(&Some("gcc".to_string())));
    assert_eq!(record.outputs, vec![PathBuf::from("a.o")]);
    let stamp = record
        .inputs
        .get(&PathBuf::from("a.c"))
        .ok_or("a.c not recorded")?;
    assert_eq!(stamp.len, "int main() {}".len() as u64);
    assert_eq!(stamp.digest, blake3::hash(b"int main() {}").to_hex().to_string());
    Ok(())
}

#[test]
fn optional_input_may_be_absent_and_its_arrival_counts() -> TestResult {
    let harness = Harness::new(
        TaskBuilder::new(&["a.o"])
            .input("a.c")
            .optional_input("local.h")
            .build(),
    )?;
    harness.fs.add_file("a.c", "int main() {}");
    harness.fs.add_file("a.o", "object");

    // absent: neither an error nor part of the record
    assert_eq!(
        harness.evaluate(None, &HashSet::new())?,
        stale(StaleReason::NoRecord)
    );
    let record = harness.snapshot()?;
    assert!(!record.inputs.contains_key(&PathBuf::from("local.h")));
    assert_eq!(harness.verdict(&record)?, Verdict::Fresh);

    harness.fs.add_file("local.h", "#define LOCAL 1");
    assert_eq!(
        harness.verdict(&record)?,
        stale(StaleReason::InputAdded(PathBuf::from("local.h")))
    );

    let record = harness.snapshot()?;
    assert!(record.inputs.contains_key(&PathBuf::from("local.h")));
    assert_eq!(harness.verdict(&record)?, Verdict::Fresh);

    harness.fs.remove("local.h");
    assert_eq!(
        harness.verdict(&record)?,
        stale(StaleReason::InputRemoved(PathBuf::from("local.h")))
    );
    Ok(())
}

#[test]
fn input_listed_both_ways_stays_required() -> TestResult {
    let harness = Harness::new(
        TaskBuilder::new(&["a.o"])
            .input("a.c")
            .optional_input("a.c")
            .build(),
    )?;

    let err = harness.evaluate(None, &HashSet::new()).unwrap_err();
    assert_eq!(err, ExecutionError::MissingInput(PathBuf::from("a.c")));
    Ok(())
}
