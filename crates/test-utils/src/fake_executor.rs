use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use taskforge::dag::ScheduledTask;
use taskforge::engine::{RuntimeEvent, TaskResult};
use taskforge::errors::{ExecutionError, Result};
use taskforge::exec::ExecutorBackend;
use taskforge::fs::FileSystem;
use taskforge::fs::mock::MockFileSystem;

#[derive(Debug, Default)]
struct ScriptState {
    /// label -> exit code
    failures: HashMap<String, i32>,
    /// labels whose program "does not exist"
    not_found: HashSet<String>,
    /// outputs the command "forgets" to write
    omitted: HashSet<PathBuf>,
    /// fixed content for an output (e.g. a dependency-list file)
    contents: HashMap<PathBuf, String>,
    delays: HashMap<String, Duration>,
    default_delay: Option<Duration>,
    executed: Vec<String>,
    runs: u64,
    in_flight: usize,
    max_in_flight: usize,
}

/// Shared, scriptable behaviour for [`FakeExecutor`].
///
/// By default every task succeeds and writes each of its outputs to the
/// mock filesystem with the content `"{label} run {n}"`, `n` being a global
/// run counter, so every run changes the output content.
///
/// Clones share state, so a test keeps one handle to script behaviour and
/// inspect what ran while the build owns the executor.
#[derive(Debug, Clone)]
pub struct FakeScript {
    fs: MockFileSystem,
    state: Arc<Mutex<ScriptState>>,
}

impl FakeScript {
    pub fn new(fs: MockFileSystem) -> Self {
        Self {
            fs,
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The task labelled `label` exits with `code`, writing nothing.
    pub fn fail(&self, label: &str, code: i32) -> &Self {
        self.state().failures.insert(label.to_string(), code);
        self
    }

    pub fn succeed(&self, label: &str) -> &Self {
        let mut state = self.state();
        state.failures.remove(label);
        state.not_found.remove(label);
        self
    }

    /// The task labelled `label` fails as if its program was not on `PATH`.
    pub fn not_found(&self, label: &str) -> &Self {
        self.state().not_found.insert(label.to_string());
        self
    }

    /// Exit successfully without writing `output`.
    pub fn omit(&self, output: &str) -> &Self {
        self.state().omitted.insert(PathBuf::from(output));
        self
    }

    /// Write exactly `content` to `output` whenever its task runs.
    pub fn write(&self, output: &str, content: &str) -> &Self {
        self.state()
            .contents
            .insert(PathBuf::from(output), content.to_string());
        self
    }

    pub fn delay(&self, label: &str, delay: Duration) -> &Self {
        self.state().delays.insert(label.to_string(), delay);
        self
    }

    pub fn delay_all(&self, delay: Duration) -> &Self {
        self.state().default_delay = Some(delay);
        self
    }

    /// Labels of every task dispatched so far, in dispatch order.
    pub fn executed(&self) -> Vec<String> {
        self.state().executed.clone()
    }

    /// Like [`executed`](Self::executed), but clears the log.
    pub fn take_executed(&self) -> Vec<String> {
        std::mem::take(&mut self.state().executed)
    }

    /// Highest number of tasks that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.state().max_in_flight
    }

    /// Build an executor for one run, wired to `runtime_tx`.
    pub fn executor(&self, runtime_tx: mpsc::Sender<RuntimeEvent>) -> FakeExecutor {
        FakeExecutor {
            runtime_tx,
            script: self.clone(),
        }
    }

    async fn run(&self, task: &ScheduledTask) -> TaskResult {
        let delay = {
            let mut state = self.state();
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            state
                .delays
                .get(&task.label)
                .copied()
                .or(state.default_delay)
        };

        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        let result = self.apply(task);
        self.state().in_flight -= 1;
        result
    }

    fn apply(&self, task: &ScheduledTask) -> TaskResult {
        let mut state = self.state();
        let duration = Duration::from_millis(1);

        if state.not_found.contains(&task.label) {
            let program = task.command.first().cloned().unwrap_or_default();
            return TaskResult::failure(ExecutionError::CommandNotFound(program), duration);
        }
        if let Some(code) = state.failures.get(&task.label) {
            return TaskResult::failure(
                ExecutionError::NonZeroExit {
                    code: Some(*code),
                    stderr_tail: format!("{}: scripted failure", task.label),
                },
                duration,
            );
        }

        state.runs += 1;
        let run = state.runs;
        for output in &task.outputs {
            if state.omitted.contains(output) {
                continue;
            }
            let content = state
                .contents
                .get(output)
                .cloned()
                .unwrap_or_else(|| format!("{} run {run}\n", task.label));
            write_output(&self.fs, output, &content);
        }

        TaskResult::success(duration)
    }
}

fn write_output(fs: &MockFileSystem, path: &Path, content: &str) {
    fs.write(path, content.as_bytes())
        .expect("mock filesystem writes never fail");
}

/// A fake executor that:
/// - records which tasks were "run"
/// - simulates each command against the mock filesystem on its own Tokio
///   task, so several tasks can be in flight at once
/// - reports exactly one `TaskCompleted` per scheduled task.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    script: FakeScript,
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let script = self.script.clone();

        Box::pin(async move {
            for task in tasks {
                script.state().executed.push(task.label.clone());

                let tx = tx.clone();
                let script = script.clone();
                tokio::spawn(async move {
                    let result = script.run(&task).await;
                    let _ = tx
                        .send(RuntimeEvent::TaskCompleted {
                            task: task.id,
                            result,
                        })
                        .await;
                });
            }
            Ok(())
        })
    }
}
