// src/exec/executor_loop.rs

//! Main executor loop that spawns task processes.

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::exec::task_runner::run_task;

/// Spawn the background executor loop.
///
/// The returned `mpsc::Sender<ScheduledTask>` is what `RealExecutorBackend`
/// forwards scheduled tasks to. Each scheduled task is executed in its own
/// Tokio task; how many run at once is decided by the build coordinator,
/// which never dispatches more than its slot count.
pub fn spawn_executor(runtime_tx: mpsc::Sender<RuntimeEvent>) -> mpsc::Sender<ScheduledTask> {
    let (tx, mut rx) = mpsc::channel::<ScheduledTask>(32);

    tokio::spawn(async move {
        info!("executor loop started");

        while let Some(task) = rx.recv().await {
            let rt_tx = runtime_tx.clone();
            let label = task.label.clone();
            tokio::spawn(async move {
                run_task(task, rt_tx).await;
                debug!(task = %label, "task runner future finished");
            });
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}
