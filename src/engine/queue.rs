// src/engine/queue.rs

use std::collections::VecDeque;

use tracing::debug;

use crate::types::TaskId;

/// Stale tasks waiting for one of `jobs` execution slots.
///
/// Tasks are dispatched in the order they were found stale. `jobs` is
/// clamped to at least 1, as zero slots would never make progress.
#[derive(Debug)]
pub struct SlotQueue {
    jobs: usize,
    running: usize,
    waiting: VecDeque<TaskId>,
}

impl SlotQueue {
    pub fn new(jobs: usize) -> Self {
        Self {
            jobs: jobs.max(1),
            running: 0,
            waiting: VecDeque::new(),
        }
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Number of dispatched tasks that have not reported back yet.
    pub fn running(&self) -> usize {
        self.running
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    pub fn push(&mut self, task: TaskId) {
        debug!(task = %task, waiting = self.waiting.len() + 1, "queued stale task");
        self.waiting.push_back(task);
    }

    /// Take the next waiting task if a slot is free, occupying the slot.
    pub fn next_dispatchable(&mut self) -> Option<TaskId> {
        if self.running >= self.jobs {
            return None;
        }
        let task = self.waiting.pop_front()?;
        self.running += 1;
        Some(task)
    }

    /// Release the slot of a task that reported back.
    pub fn task_finished(&mut self) {
        self.running = self.running.saturating_sub(1);
    }

    /// Drop every waiting task, returning them.
    pub fn drain_waiting(&mut self) -> Vec<TaskId> {
        self.waiting.drain(..).collect()
    }
}
