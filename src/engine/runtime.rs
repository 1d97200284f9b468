// src/engine/runtime.rs

use std::collections::BTreeSet;
use std::fmt;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::dag::ScheduledTask;
use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::types::TaskId;

use super::core::BuildCore;
use super::report::ExecutionReport;
use super::{CoreCommand, RuntimeEvent};

/// Drives the build coordinator in response to `RuntimeEvent`s, and
/// delegates actual command execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `BuildCore`, which contains all the build
/// semantics. This struct handles async IO: reading events from the channel
/// and dispatching tasks to the executor.
pub struct Runtime<'a, E: ExecutorBackend> {
    core: BuildCore<'a>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<'a, E: ExecutorBackend> Runtime<'a, E> {
    pub fn new(core: BuildCore<'a>, event_rx: mpsc::Receiver<RuntimeEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
        }
    }

    /// Main event loop.
    ///
    /// - Starts the run over `selection`.
    /// - Consumes `RuntimeEvent`s from `event_rx` and feeds them into the
    ///   core.
    /// - Executes the commands returned by the core.
    ///
    /// Returns once every task in the run has an outcome. Commands that are
    /// still running at that point cannot exist: a task only becomes terminal
    /// after its completion event arrived.
    pub async fn run(mut self, selection: BTreeSet<TaskId>) -> Result<ExecutionReport> {
        info!(tasks = selection.len(), "build runtime started");

        let mut step = self.core.start(selection);

        loop {
            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                break;
            }

            if self.core.running() == 0 {
                return Err(anyhow!(
                    "build stalled: tasks remain but none is running or ready"
                )
                .into());
            }

            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    return Err(anyhow!("runtime event channel closed with tasks still running").into());
                }
            };

            debug!(?event, "runtime received event");
            step = self.core.step(event);
        }

        info!("build runtime finished");
        Ok(self.core.into_report())
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(tasks) => self.spawn_ready(tasks).await,
        }
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let labels: Vec<_> = tasks.iter().map(|t| t.label.as_str()).collect();
        debug!(?labels, "spawning ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }
}
