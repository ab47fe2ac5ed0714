//! Executor registries resolved once at startup.

use crate::task::{
    domain::{Task, TaskCheckType, TaskType},
    ports::{CancellationSupport, TaskCheckExecutor, TaskExecutor},
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Errors raised while building a registry.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// An executor was already registered for the task type.
    #[error("executor already registered for task type {0}")]
    DuplicateTaskType(TaskType),
    /// An executor was already registered for the check type.
    #[error("executor already registered for task check type {0}")]
    DuplicateCheckType(TaskCheckType),
}

/// Maps task types to their executors and cancellation capability.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<TaskType, Arc<dyn TaskExecutor>>,
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.executors.keys().collect();
        types.sort();
        f.debug_struct("ExecutorRegistry")
            .field("task_types", &types)
            .finish()
    }
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the executor for `task_type`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTaskType`] when the type already
    /// has an executor.
    pub fn register(
        mut self,
        task_type: TaskType,
        executor: Arc<dyn TaskExecutor>,
    ) -> Result<Self, RegistryError> {
        if self.executors.contains_key(&task_type) {
            return Err(RegistryError::DuplicateTaskType(task_type));
        }
        self.executors.insert(task_type, executor);
        Ok(self)
    }

    /// Returns the executor for `task_type`.
    #[must_use]
    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(&task_type).cloned()
    }

    /// Returns the cancellation capability of `task_type`. Unregistered
    /// types cannot be canceled.
    #[must_use]
    pub fn cancellation(&self, task_type: TaskType) -> CancellationSupport {
        self.executors
            .get(&task_type)
            .map_or(CancellationSupport::Unsupported, |executor| {
                executor.cancellation()
            })
    }

    /// Lets the executor of a canceled task free what it holds for it.
    /// Failures are logged.
    pub async fn release(&self, task: &Task) {
        let Some(executor) = self.executors.get(&task.task_type()) else {
            return;
        };
        if let Err(err) = executor.release(task).await {
            warn!(task_id = %task.id(), error = %err, "failed to release task resources");
        }
    }

    /// Returns the task types with no registered executor.
    #[must_use]
    pub fn missing_types(&self) -> Vec<TaskType> {
        TaskType::ALL
            .into_iter()
            .filter(|task_type| !self.executors.contains_key(task_type))
            .collect()
    }
}

/// Maps check types to their executors.
#[derive(Clone, Default)]
pub struct TaskCheckExecutorRegistry {
    executors: HashMap<TaskCheckType, Arc<dyn TaskCheckExecutor>>,
}

impl fmt::Debug for TaskCheckExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.executors.keys().collect();
        types.sort();
        f.debug_struct("TaskCheckExecutorRegistry")
            .field("check_types", &types)
            .finish()
    }
}

impl TaskCheckExecutorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the executor for `check_type`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateCheckType`] when the type already
    /// has an executor.
    pub fn register(
        mut self,
        check_type: TaskCheckType,
        executor: Arc<dyn TaskCheckExecutor>,
    ) -> Result<Self, RegistryError> {
        if self.executors.contains_key(&check_type) {
            return Err(RegistryError::DuplicateCheckType(check_type));
        }
        self.executors.insert(check_type, executor);
        Ok(self)
    }

    /// Returns the executor for `check_type`.
    #[must_use]
    pub fn get(&self, check_type: TaskCheckType) -> Option<Arc<dyn TaskCheckExecutor>> {
        self.executors.get(&check_type).cloned()
    }
}
