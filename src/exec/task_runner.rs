// src/exec/task_runner.rs

//! Individual task process runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskResult};
use crate::errors::ExecutionError;

/// How many trailing stderr lines are kept for the failure report.
pub const STDERR_TAIL_LINES: usize = 20;

/// Run a single task command and emit exactly one `TaskCompleted` event.
///
/// Spawn failures and lookup failures are reported as failed completions,
/// never dropped.
pub async fn run_task(task: ScheduledTask, runtime_tx: mpsc::Sender<RuntimeEvent>) {
    let id = task.id;
    let label = task.label.clone();
    let result = execute(&task).await;

    if let Err(err) = runtime_tx
        .send(RuntimeEvent::TaskCompleted { task: id, result })
        .await
    {
        error!(task = %label, error = %err, "sending TaskCompleted event to runtime");
    }
}

/// Run the command to completion and describe what happened.
pub async fn execute(task: &ScheduledTask) -> TaskResult {
    let started = Instant::now();
    let status = run_command(task).await;
    let duration = started.elapsed();

    match &status {
        Ok(()) => info!(task = %task.label, duration_ms = duration.as_millis() as u64, "task process exited"),
        Err(err) => info!(task = %task.label, error = %err, "task process failed"),
    }

    TaskResult { status, duration }
}

async fn run_command(task: &ScheduledTask) -> Result<(), ExecutionError> {
    let Some((program, args)) = task.command.split_first() else {
        return Err(ExecutionError::Spawn("empty command".to_string()));
    };

    let cwd = working_dir(&task.working_dir);
    let resolved = resolve_program(program, &cwd)?;

    info!(
        task = %task.label,
        program = %resolved.display(),
        args = ?args,
        "starting task process"
    );

    // The program is already resolved, so the command needs no PATH of
    // its own.
    let mut cmd = Command::new(&resolved);
    cmd.args(args)
        .env_clear()
        .envs(task.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .current_dir(&cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| ExecutionError::Spawn(format!("{}: {e}", resolved.display())))?;

    // Both pipes are always drained so the child never blocks on a full
    // buffer.
    let stdout_reader = child
        .stdout
        .take()
        .map(|out| tokio::spawn(drain_lines(out, task.label.clone(), "stdout", 0)));
    let stderr_reader = child
        .stderr
        .take()
        .map(|err| tokio::spawn(drain_lines(err, task.label.clone(), "stderr", STDERR_TAIL_LINES)));

    let status = child
        .wait()
        .await
        .map_err(|e| ExecutionError::Spawn(format!("waiting for {}: {e}", resolved.display())))?;

    if let Some(handle) = stdout_reader {
        let _ = handle.await;
    }
    let stderr_tail = match stderr_reader {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    };

    if status.success() {
        Ok(())
    } else {
        Err(ExecutionError::NonZeroExit {
            code: status.code(),
            stderr_tail,
        })
    }
}

/// Log every line of a child stream at debug level, keeping the last
/// `keep` lines.
async fn drain_lines<R>(stream: R, label: String, name: &'static str, keep: usize) -> String
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(keep);

    while let Ok(Some(line)) = lines.next_line().await {
        debug!(task = %label, stream = name, "{}", line);
        if keep > 0 {
            if tail.len() == keep {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }

    tail.into_iter().collect::<Vec<_>>().join("\n")
}

fn working_dir(dir: &Path) -> PathBuf {
    if dir.as_os_str().is_empty() {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        dir.to_path_buf()
    }
}

/// Find the program on `PATH`, or relative to the working directory when it
/// contains a path separator.
pub fn resolve_program(program: &str, cwd: &Path) -> Result<PathBuf, ExecutionError> {
    which::which_in(program, std::env::var_os("PATH"), cwd)
        .map_err(|_| ExecutionError::CommandNotFound(program.to_string()))
}
