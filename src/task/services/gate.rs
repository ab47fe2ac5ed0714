//! Task Check Gate: decides whether a task's latest checks allow it to
//! advance.

use crate::task::{
    domain::{CheckStatus, Task, TaskCheckRun, TaskCheckRunStatus, TaskCheckType},
    ports::{TaskCheckRunFind, TaskStore, TaskStoreResult},
};
use std::sync::Arc;

/// Returns the required check types whose latest terminal run does not meet
/// `floor`.
///
/// The latest run is the `Done` or `Failed` run with the highest id. A check
/// type with no terminal run, or whose latest run failed, always blocks.
#[must_use]
pub fn blocking_checks(
    required: &[TaskCheckType],
    runs: &[TaskCheckRun],
    floor: CheckStatus,
) -> Vec<TaskCheckType> {
    required
        .iter()
        .copied()
        .filter(|check_type| {
            let latest = runs
                .iter()
                .filter(|run| {
                    run.check_type == *check_type && run.status != TaskCheckRunStatus::Running
                })
                .max_by_key(|run| run.id);
            !latest.is_some_and(|run| run.passes(floor))
        })
        .collect()
}

/// Evaluates the check runs of tasks against a severity floor.
#[derive(Debug)]
pub struct TaskCheckGate<S>
where
    S: TaskStore,
{
    store: Arc<S>,
}

impl<S> Clone for TaskCheckGate<S>
where
    S: TaskStore,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> TaskCheckGate<S>
where
    S: TaskStore,
{
    /// Creates a gate reading check runs from `store`.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the required checks currently blocking `task` at `floor`.
    ///
    /// # Errors
    ///
    /// Returns the store error when check runs cannot be read.
    pub async fn blocking(
        &self,
        task: &Task,
        floor: CheckStatus,
    ) -> TaskStoreResult<Vec<TaskCheckType>> {
        let required = task.task_type().required_checks(task.instance().engine);
        if required.is_empty() {
            return Ok(Vec::new());
        }
        let runs = self
            .store
            .find_task_check_runs(&TaskCheckRunFind {
                task_id: Some(task.id()),
                status_list: Some(vec![TaskCheckRunStatus::Done, TaskCheckRunStatus::Failed]),
            })
            .await?;
        Ok(blocking_checks(&required, &runs, floor))
    }

    /// Returns whether every required check of `task` meets `floor`.
    ///
    /// # Errors
    ///
    /// Returns the store error when check runs cannot be read.
    pub async fn passes(&self, task: &Task, floor: CheckStatus) -> TaskStoreResult<bool> {
        Ok(self.blocking(task, floor).await?.is_empty())
    }
}
