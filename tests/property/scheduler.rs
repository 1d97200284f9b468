use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use taskforge::dag::{BuildGraph, RunState, ScheduledTask, TaskRef};
use taskforge::engine::{BuildCore, CoreCommand, Outcome, RunOptions, RuntimeEvent, TaskResult};
use taskforge::env::MapEnv;
use taskforge::errors::ExecutionError;
use taskforge::fingerprint::Blake3Hasher;
use taskforge::fs::FileSystem;
use taskforge::fs::mock::MockFileSystem;
use taskforge::store::MemoryRecordStore;
use taskforge::types::{FailurePolicy, TaskId};
use taskforge_test_utils::builders::TaskBuilder;

/// A random DAG: task `i` may only reference tasks `0..i`.
#[derive(Debug, Clone)]
struct Scenario {
    data: Vec<BTreeSet<usize>>,
    ordering: Vec<BTreeSet<usize>>,
    failing: BTreeSet<usize>,
    jobs: usize,
}

fn scenario_strategy(max_tasks: usize) -> impl Strategy<Value = Scenario> {
    (1..=max_tasks).prop_flat_map(|n| {
        let deps = proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..3), n);
        let order = proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..2), n);
        let failing = proptest::collection::btree_set(0..n, 0..=n.min(2));
        (deps, order, failing, 1..=4usize).prop_map(move |(deps, order, failing, jobs)| {
            let sanitize = |raw: Vec<Vec<usize>>| -> Vec<BTreeSet<usize>> {
                raw.into_iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        if i == 0 {
                            BTreeSet::new()
                        } else {
                            picks.into_iter().map(|p| p % i).collect()
                        }
                    })
                    .collect()
            };
            let data = sanitize(deps);
            let mut ordering = sanitize(order);
            for (i, set) in ordering.iter_mut().enumerate() {
                set.retain(|j| !data[i].contains(j));
            }
            Scenario {
                data,
                ordering,
                failing,
                jobs,
            }
        })
    })
}

fn output(i: usize) -> String {
    format!("t{i}.out")
}

fn build_graph(s: &Scenario) -> (BuildGraph, Vec<TaskId>) {
    let mut graph = BuildGraph::new();
    let mut ids = Vec::new();
    for i in 0..s.data.len() {
        let mut task = TaskBuilder::new(&[output(i).as_str()]);
        for j in &s.data[i] {
            task = task.input(&output(*j));
        }
        for j in &s.ordering[i] {
            task = task.not_before(TaskRef::Id(ids[*j]));
        }
        ids.push(graph.add_task(task.build()).expect("generated graph is acyclic"));
    }
    (graph, ids)
}

/// Every task whose data ancestry (itself included) contains `i`.
fn data_descendants(s: &Scenario, i: usize) -> BTreeSet<usize> {
    let mut out = BTreeSet::from([i]);
    for k in (i + 1)..s.data.len() {
        if s.data[k].iter().any(|j| out.contains(j)) {
            out.insert(k);
        }
    }
    out
}

struct RunLog {
    outcomes: Vec<Outcome>,
    max_in_flight: usize,
    dispatched_after_halt: bool,
}

/// Drive the synchronous core by hand: completions are fed back one at a
/// time, oldest dispatch first.
fn drive(s: &Scenario, policy: FailurePolicy) -> Result<RunLog, TestCaseError> {
    let (mut graph, ids) = build_graph(s);
    let fs = MockFileSystem::new();
    let hasher = Blake3Hasher::new(Arc::new(fs.clone()));
    let env = MapEnv::new();
    let mut store = MemoryRecordStore::new();
    let index_of = |id: TaskId| id.index();

    let mut core = BuildCore::new(
        &mut graph,
        &mut store,
        &fs,
        &hasher,
        &env,
        RunOptions {
            jobs: s.jobs,
            on_failure: policy,
        },
    );

    let mut in_flight: VecDeque<ScheduledTask> = VecDeque::new();
    let mut max_in_flight = 0;
    let mut failure_seen = false;
    let mut dispatched_after_halt = false;
    let mut step = core.start(ids.iter().copied().collect());

    for _ in 0..=(s.data.len() * 2 + 2) {
        for command in step.commands {
            let CoreCommand::DispatchTasks(tasks) = command;
            for task in tasks {
                let i = index_of(task.id);
                for j in &s.data[i] {
                    let ok = core
                        .scheduler()
                        .state_of(ids[*j])
                        .is_some_and(RunState::is_resolved_ok);
                    prop_assert!(ok, "task {i} dispatched before data predecessor {j} succeeded");
                }
                for j in &s.ordering[i] {
                    let done = core
                        .scheduler()
                        .state_of(ids[*j])
                        .is_some_and(RunState::is_terminal);
                    prop_assert!(done, "task {i} dispatched before ordering predecessor {j} finished");
                }
                if failure_seen && policy == FailurePolicy::Halt {
                    dispatched_after_halt = true;
                }
                in_flight.push_back(task);
            }
        }
        max_in_flight = max_in_flight.max(in_flight.len());

        if !step.keep_running {
            let report = core.into_report();
            let outcomes = ids
                .iter()
                .map(|id| report.outcome(*id).cloned())
                .collect::<Option<Vec<_>>>();
            prop_assert!(outcomes.is_some(), "a task has no outcome");
            prop_assert_eq!(report.len(), ids.len());
            return Ok(RunLog {
                outcomes: outcomes.unwrap_or_default(),
                max_in_flight,
                dispatched_after_halt,
            });
        }

        let Some(task) = in_flight.pop_front() else {
            return Err(TestCaseError::fail("core stalled with nothing in flight"));
        };
        let i = index_of(task.id);
        let result = if s.failing.contains(&i) {
            failure_seen = true;
            TaskResult::failure(
                ExecutionError::NonZeroExit {
                    code: Some(1),
                    stderr_tail: String::new(),
                },
                Duration::ZERO,
            )
        } else {
            for out in &task.outputs {
                fs.write(out, b"built").expect("mock write");
            }
            TaskResult::success(Duration::ZERO)
        };
        step = core.step(RuntimeEvent::TaskCompleted {
            task: task.id,
            result,
        });
    }

    Err(TestCaseError::fail("core did not finish within the event budget"))
}

proptest! {
    #[test]
    fn continue_policy_runs_exactly_the_unaffected_tasks(s in scenario_strategy(8)) {
        let log = drive(&s, FailurePolicy::Continue)?;

        prop_assert!(log.max_in_flight <= s.jobs);

        let mut poisoned = BTreeSet::new();
        for f in &s.failing {
            poisoned.extend(data_descendants(&s, *f));
        }

        for (i, outcome) in log.outcomes.iter().enumerate() {
            match outcome {
                Outcome::Ran { .. } => prop_assert!(!poisoned.contains(&i)),
                Outcome::Failed(_) => prop_assert!(s.failing.contains(&i)),
                Outcome::Skipped { cause } => {
                    prop_assert!(poisoned.contains(&i));
                    prop_assert!(s.failing.contains(&cause.index()));
                    prop_assert!(data_descendants(&s, cause.index()).contains(&i));
                }
                Outcome::Fresh => prop_assert!(false, "nothing can be fresh in a first build"),
            }
        }
    }

    #[test]
    fn halt_policy_starts_nothing_after_a_failure(s in scenario_strategy(8)) {
        let log = drive(&s, FailurePolicy::Halt)?;

        prop_assert!(log.max_in_flight <= s.jobs);
        prop_assert!(!log.dispatched_after_halt);

        let failed: Vec<usize> = log
            .outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_failure())
            .map(|(i, _)| i)
            .collect();
        for i in &failed {
            prop_assert!(s.failing.contains(i));
        }
        if let Some(first) = failed.first() {
            for outcome in &log.outcomes {
                if let Outcome::Skipped { cause } = outcome {
                    prop_assert!(failed.contains(&cause.index()), "skip cause {} did not fail (first {first})", cause);
                }
            }
        }
    }
}
