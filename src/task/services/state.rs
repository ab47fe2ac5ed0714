//! Shared mutable scheduler state.

use crate::task::domain::{InstanceId, TaskCheckRunId, TaskId, TaskProgress};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

/// Running-task set, cancel registry, and per-instance connection counters.
///
/// One mutex guards all of them. Every critical section is a single
/// check-and-update and never spans an `await`.
#[derive(Debug, Default)]
pub struct SchedulerState {
    inner: Mutex<SchedulerStateInner>,
}

#[derive(Debug, Default)]
struct SchedulerStateInner {
    running_tasks: HashSet<TaskId>,
    cancels: HashMap<TaskId, CancellationToken>,
    outstanding_connections: HashMap<InstanceId, usize>,
    running_checks: HashSet<TaskCheckRunId>,
}

impl SchedulerState {
    /// Creates empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerStateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserves one connection slot on `instance_id` unless `max` slots are
    /// already taken.
    pub fn try_acquire_connection(&self, instance_id: InstanceId, max: usize) -> bool {
        let mut inner = self.lock();
        let count = inner.outstanding_connections.entry(instance_id).or_insert(0);
        if *count >= max {
            return false;
        }
        *count += 1;
        true
    }

    /// Releases one connection slot on `instance_id`.
    pub fn release_connection(&self, instance_id: InstanceId) {
        let mut inner = self.lock();
        if let Some(count) = inner.outstanding_connections.get_mut(&instance_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                inner.outstanding_connections.remove(&instance_id);
            }
        }
    }

    /// Returns the number of reserved slots on `instance_id`.
    #[must_use]
    pub fn outstanding_connections(&self, instance_id: InstanceId) -> usize {
        self.lock()
            .outstanding_connections
            .get(&instance_id)
            .copied()
            .unwrap_or(0)
    }

    /// Marks a task running and registers its cancel token. Returns `false`
    /// when the task is already tracked.
    pub fn try_start_task(&self, task_id: TaskId, token: CancellationToken) -> bool {
        let mut inner = self.lock();
        if !inner.running_tasks.insert(task_id) {
            return false;
        }
        inner.cancels.insert(task_id, token);
        true
    }

    /// Removes a task from the running set and cancel registry.
    pub fn finish_task(&self, task_id: TaskId) {
        let mut inner = self.lock();
        inner.running_tasks.remove(&task_id);
        inner.cancels.remove(&task_id);
    }

    /// Returns whether the task is tracked as running.
    #[must_use]
    pub fn is_task_running(&self, task_id: TaskId) -> bool {
        self.lock().running_tasks.contains(&task_id)
    }

    /// Returns the cancel token of a running task.
    #[must_use]
    pub fn cancel_token(&self, task_id: TaskId) -> Option<CancellationToken> {
        self.lock().cancels.get(&task_id).cloned()
    }

    /// Marks a check run as executing. Returns `false` when already tracked.
    pub fn try_start_check(&self, check_run_id: TaskCheckRunId) -> bool {
        self.lock().running_checks.insert(check_run_id)
    }

    /// Removes a check run from the executing set.
    pub fn finish_check(&self, check_run_id: TaskCheckRunId) {
        self.lock().running_checks.remove(&check_run_id);
    }
}

/// Latest progress published by running executors.
#[derive(Debug, Default)]
pub struct TaskProgressBoard {
    entries: RwLock<HashMap<TaskId, TaskProgress>>,
}

impl TaskProgressBoard {
    /// Creates an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes progress for a task.
    pub fn publish(&self, task_id: TaskId, progress: TaskProgress) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id, progress);
    }

    /// Returns the latest progress for a task.
    #[must_use]
    pub fn get(&self, task_id: TaskId) -> Option<TaskProgress> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task_id)
            .copied()
    }

    /// Drops the entry of a task that stopped executing.
    pub fn remove(&self, task_id: TaskId) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&task_id);
    }
}
