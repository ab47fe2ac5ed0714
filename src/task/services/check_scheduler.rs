//! Runs pending task check runs alongside the task scheduler.

use super::{SchedulerError, SchedulerState, TaskCheckExecutorRegistry, join_error_message};
use crate::config::SchedulerConfig;
use crate::observability::check_span;
use crate::task::{
    domain::{
        CheckResult, ErrorCode, InstanceId, PrincipalId, Task, TaskCheckRun, TaskCheckRunId,
        TaskCheckRunResult, TaskCheckRunStatus,
    },
    ports::{
        ExecutorError, TaskCheckExecutor, TaskCheckRunFind, TaskCheckRunStatusPatch, TaskStore,
    },
};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

/// Executes `Running` check runs with their registered executors.
///
/// Check executions draw from the same per-instance connection slots as
/// task executions when both schedulers share one [`SchedulerState`].
pub struct TaskCheckScheduler<S>
where
    S: TaskStore + 'static,
{
    store: Arc<S>,
    registry: Arc<TaskCheckExecutorRegistry>,
    state: Arc<SchedulerState>,
    config: Arc<SchedulerConfig>,
}

impl<S> Clone for TaskCheckScheduler<S>
where
    S: TaskStore + 'static,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            state: Arc::clone(&self.state),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S> TaskCheckScheduler<S>
where
    S: TaskStore + 'static,
{
    /// Creates a check scheduler sharing `state` with a task scheduler.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        registry: TaskCheckExecutorRegistry,
        state: Arc<SchedulerState>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            registry: Arc::new(registry),
            state,
            config: Arc::new(config),
        }
    }

    /// Runs the tick loop until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("task check scheduler started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("task check scheduler stopped");
                    return;
                }
                _ = interval.tick() => {}
            }

            let scheduler = self.clone();
            let root = shutdown.clone();
            match tokio::spawn(async move { scheduler.tick(&root).await }).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(error = %err, "task check scheduler tick failed"),
                Err(join_err) => error!(
                    panic = %join_error_message(join_err),
                    "recovered panic in task check scheduler tick"
                ),
            }
        }
    }

    /// Starts every `Running` check run not already executing.
    ///
    /// # Errors
    ///
    /// Returns the store error when check runs cannot be listed.
    pub async fn tick(&self, root: &CancellationToken) -> Result<(), SchedulerError> {
        let runs = self
            .store
            .find_task_check_runs(&TaskCheckRunFind {
                task_id: None,
                status_list: Some(vec![TaskCheckRunStatus::Running]),
            })
            .await?;
        for check_run in runs {
            if !self.state.try_start_check(check_run.id) {
                continue;
            }
            if let Err(err) = self.start(root, check_run.clone()).await {
                self.state.finish_check(check_run.id);
                warn!(check_run_id = %check_run.id, error = %err, "failed to start task check");
            }
        }
        Ok(())
    }

    async fn start(
        &self,
        root: &CancellationToken,
        check_run: TaskCheckRun,
    ) -> Result<(), SchedulerError> {
        let Some(task) = self.store.get_task(check_run.task_id).await? else {
            let err = ExecutorError::new(
                ErrorCode::NotFound,
                format!("task {} not found", check_run.task_id),
            );
            self.record(&check_run, Err(err)).await?;
            self.state.finish_check(check_run.id);
            return Ok(());
        };

        let Some(executor) = self.registry.get(check_run.check_type) else {
            error!(
                check_run_id = %check_run.id,
                check_type = %check_run.check_type,
                "no executor registered for task check type"
            );
            self.state.finish_check(check_run.id);
            return Ok(());
        };

        let instance_id = task.instance().id;
        if !self
            .state
            .try_acquire_connection(instance_id, self.config.max_connections_per_instance)
        {
            debug!(check_run_id = %check_run.id, "instance connection cap reached");
            self.state.finish_check(check_run.id);
            return Ok(());
        }

        let span = check_span(&check_run);
        let scheduler = self.clone();
        let token = root.child_token();
        tokio::spawn(
            async move {
                scheduler.execute(executor, token, check_run, task).await;
            }
            .instrument(span),
        );
        Ok(())
    }

    async fn execute(
        self,
        executor: Arc<dyn TaskCheckExecutor>,
        token: CancellationToken,
        check_run: TaskCheckRun,
        task: Task,
    ) {
        let _guard = CheckGuard {
            state: Arc::clone(&self.state),
            check_run_id: check_run.id,
            instance_id: task.instance().id,
        };

        let run = check_run.clone();
        let handle = tokio::spawn(async move { executor.run(&token, &run, &task).await });
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(ExecutorError::internal(format!(
                "task check executor panicked: {}",
                join_error_message(join_err)
            ))),
        };

        if let Err(err) = self.record(&check_run, outcome).await {
            error!(error = %err, "failed to record task check result");
        }
    }

    async fn record(
        &self,
        check_run: &TaskCheckRun,
        outcome: Result<Vec<CheckResult>, ExecutorError>,
    ) -> Result<(), SchedulerError> {
        let patch = match outcome {
            Ok(results) => TaskCheckRunStatusPatch {
                id: check_run.id,
                updater_id: PrincipalId::SYSTEM_BOT,
                status: TaskCheckRunStatus::Done,
                code: ErrorCode::Ok,
                result: TaskCheckRunResult {
                    detail: String::new(),
                    results,
                },
            },
            Err(err) => {
                warn!(error = %err, code = %err.code, "task check failed");
                TaskCheckRunStatusPatch {
                    id: check_run.id,
                    updater_id: PrincipalId::SYSTEM_BOT,
                    status: TaskCheckRunStatus::Failed,
                    code: err.code,
                    result: TaskCheckRunResult {
                        detail: err.message,
                        results: Vec::new(),
                    },
                }
            }
        };
        self.store.patch_task_check_run_status(&patch).await?;
        Ok(())
    }
}

struct CheckGuard {
    state: Arc<SchedulerState>,
    check_run_id: TaskCheckRunId,
    instance_id: InstanceId,
}

impl Drop for CheckGuard {
    fn drop(&mut self) {
        self.state.finish_check(self.check_run_id);
        self.state.release_connection(self.instance_id);
    }
}
