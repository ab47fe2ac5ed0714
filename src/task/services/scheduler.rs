//! The task scheduler loop: approval, admission, dispatch, and completion.

use super::{ExecutorRegistry, SchedulerState, TaskCheckGate, TaskProgressBoard};
use crate::config::SchedulerConfig;
use crate::observability::task_span;
use crate::task::{
    domain::{
        CheckStatus, ErrorCode, InstanceId, PrincipalId, Task, TaskDagCycle, TaskDomainError,
        TaskId, TaskRunResult, TaskStatus,
    },
    ports::{
        ActivityManager, ExecutionOutcome, ExecutorError, ExternalApprovalCanceller, TaskExecutor,
        TaskFind, TaskStatusPatch, TaskStore, TaskStoreError,
    },
};
use mockable::Clock;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

/// Service-level errors raised by scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] TaskStoreError),
    /// The dependency graph below a canceled task is cyclic.
    #[error(transparent)]
    DagCycle(#[from] TaskDagCycle),
    /// A status patch did not name exactly the task being patched.
    #[error("status patch must target exactly task {task_id}")]
    PatchMismatch {
        /// Task the caller asked to patch.
        task_id: TaskId,
    },
    /// The requested change conflicts with the current record state.
    #[error("{0}")]
    Conflict(String),
    /// A record required by the operation does not exist.
    #[error("{0}")]
    NotFound(String),
    /// A result or activity payload could not be serialized.
    #[error("failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SchedulerError {
    /// Classifies the error into a numeric code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Domain(TaskDomainError::CancellationNotImplemented { .. }) => {
                ErrorCode::NotImplemented
            }
            Self::Domain(_) | Self::PatchMismatch { .. } => ErrorCode::Invalid,
            Self::Store(err) => err.code(),
            Self::Conflict(_) => ErrorCode::Conflict,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::DagCycle(_) | Self::Serialization(_) => ErrorCode::Internal,
        }
    }

    /// Returns whether the task moved away from the status the patch was
    /// built for.
    #[must_use]
    pub const fn is_status_changed(&self) -> bool {
        matches!(self, Self::Store(TaskStoreError::StatusChanged { .. }))
    }
}

/// Ties the store, executor registry, and check gate into the tick loop.
///
/// Every field is shared, so clones drive the same scheduler state. The
/// loop hands a clone to the tokio task it spawns for each execution.
pub struct Scheduler<S, A, E, C>
where
    S: TaskStore + 'static,
    A: ActivityManager + 'static,
    E: ExternalApprovalCanceller + 'static,
    C: Clock + Send + Sync + 'static,
{
    pub(super) store: Arc<S>,
    pub(super) activities: Arc<A>,
    pub(super) approvals: Arc<E>,
    pub(super) clock: Arc<C>,
    pub(super) registry: Arc<ExecutorRegistry>,
    pub(super) state: Arc<SchedulerState>,
    pub(super) progress: Arc<TaskProgressBoard>,
    pub(super) gate: TaskCheckGate<S>,
    pub(super) config: Arc<SchedulerConfig>,
}

impl<S, A, E, C> Clone for Scheduler<S, A, E, C>
where
    S: TaskStore + 'static,
    A: ActivityManager + 'static,
    E: ExternalApprovalCanceller + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            activities: Arc::clone(&self.activities),
            approvals: Arc::clone(&self.approvals),
            clock: Arc::clone(&self.clock),
            registry: Arc::clone(&self.registry),
            state: Arc::clone(&self.state),
            progress: Arc::clone(&self.progress),
            gate: self.gate.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S, A, E, C> Scheduler<S, A, E, C>
where
    S: TaskStore + 'static,
    A: ActivityManager + 'static,
    E: ExternalApprovalCanceller + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a scheduler with fresh shared state.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        activities: Arc<A>,
        approvals: Arc<E>,
        clock: Arc<C>,
        registry: ExecutorRegistry,
        config: SchedulerConfig,
    ) -> Self {
        let gate = TaskCheckGate::new(Arc::clone(&store));
        Self {
            store,
            activities,
            approvals,
            clock,
            registry: Arc::new(registry),
            state: Arc::new(SchedulerState::new()),
            progress: Arc::new(TaskProgressBoard::new()),
            gate,
            config: Arc::new(config),
        }
    }

    /// Uses `state` instead of fresh state, so a task check scheduler can
    /// share the per-instance connection counters.
    #[must_use]
    pub fn with_state(mut self, state: Arc<SchedulerState>) -> Self {
        self.state = state;
        self
    }

    /// Uses `progress` as the progress board handed to executors.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<TaskProgressBoard>) -> Self {
        self.progress = progress;
        self
    }

    /// Returns the shared scheduler state.
    #[must_use]
    pub fn state(&self) -> Arc<SchedulerState> {
        Arc::clone(&self.state)
    }

    /// Returns the progress board.
    #[must_use]
    pub fn progress(&self) -> Arc<TaskProgressBoard> {
        Arc::clone(&self.progress)
    }

    /// Returns the scheduler configuration.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Runs the tick loop until `shutdown` is cancelled.
    ///
    /// Tasks left `Running` by a previous process are canceled first. Each
    /// tick runs on its own tokio task so a panic ends only that tick.
    /// Executions spawned by a tick hold child tokens of `shutdown`.
    pub async fn run(self, shutdown: CancellationToken) {
        if let Err(err) = self.clear_running_tasks().await {
            error!(error = %err, "failed to clear running tasks at startup");
        }

        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.config.tick_interval_ms, "task scheduler started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("task scheduler stopped");
                    return;
                }
                _ = interval.tick() => {}
            }

            let scheduler = self.clone();
            let root = shutdown.clone();
            match tokio::spawn(async move { scheduler.tick(&root).await }).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(error = %err, "task scheduler tick failed"),
                Err(join_err) => log_tick_join_error(join_err),
            }
        }
    }

    /// Runs one scheduling pass: auto-approve, promote, then dispatch.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot list candidate tasks. Errors
    /// affecting a single task are logged and the pass continues.
    pub async fn tick(&self, root: &CancellationToken) -> Result<(), SchedulerError> {
        self.auto_approve_tasks().await?;
        let promoted = self.promote_pending_tasks().await?;
        self.dispatch_running_tasks(root, promoted).await
    }

    async fn auto_approve_tasks(&self) -> Result<(), SchedulerError> {
        let tasks = self
            .store
            .find_tasks(&TaskFind::by_status([TaskStatus::PendingApproval]))
            .await?;
        for task in tasks {
            if let Err(err) = self.auto_approve(&task).await {
                warn!(task_id = %task.id(), error = %err, "failed to auto-approve task");
            }
        }
        Ok(())
    }

    async fn auto_approve(&self, task: &Task) -> Result<(), SchedulerError> {
        let policy = self
            .store
            .get_pipeline_approval_policy(task.instance().environment_id)
            .await?;
        if !policy.is_automatic() {
            return Ok(());
        }
        if !self.gate.passes(task, CheckStatus::Success).await? {
            return Ok(());
        }
        self.patch_task_status(
            task,
            TaskStatusPatch::single(task.id(), TaskStatus::Pending, PrincipalId::SYSTEM_BOT)
                .expecting(TaskStatus::PendingApproval),
        )
        .await?;
        Ok(())
    }

    async fn promote_pending_tasks(&self) -> Result<Vec<Task>, SchedulerError> {
        let tasks = self
            .store
            .find_tasks(&TaskFind::by_status([TaskStatus::Pending]))
            .await?;
        let mut promoted = Vec::new();
        for task in tasks {
            match self.try_promote(&task).await {
                Ok(Some(running)) => promoted.push(running),
                Ok(None) => {}
                Err(err) => warn!(task_id = %task.id(), error = %err, "failed to promote task"),
            }
        }
        Ok(promoted)
    }

    /// Promotes one pending task. On success the returned task holds one
    /// connection slot on its instance.
    async fn try_promote(&self, task: &Task) -> Result<Option<Task>, SchedulerError> {
        if task.instance().archived {
            return Ok(None);
        }
        if !self.is_admissible(task).await? {
            return Ok(None);
        }

        let instance_id = task.instance().id;
        if !self
            .state
            .try_acquire_connection(instance_id, self.config.max_connections_per_instance)
        {
            debug!(
                task_id = %task.id(),
                instance_id = %instance_id,
                "instance connection cap reached"
            );
            return Ok(None);
        }

        match self
            .patch_task_status(
                task,
                TaskStatusPatch::single(task.id(), TaskStatus::Running, PrincipalId::SYSTEM_BOT)
                    .expecting(TaskStatus::Pending),
            )
            .await
        {
            Ok(running) => Ok(Some(running)),
            Err(err) => {
                self.state.release_connection(instance_id);
                Err(err)
            }
        }
    }

    async fn is_admissible(&self, task: &Task) -> Result<bool, SchedulerError> {
        for blocker_id in task.blocked_by() {
            match self.store.get_task(*blocker_id).await? {
                Some(blocker) if blocker.status() == TaskStatus::Done => {}
                Some(_) => return Ok(false),
                None => {
                    warn!(
                        task_id = %task.id(),
                        blocker_id = %blocker_id,
                        "blocking task not found"
                    );
                    return Ok(false);
                }
            }
        }

        if task
            .earliest_allowed_at()
            .is_some_and(|at| at > self.clock.utc())
        {
            return Ok(false);
        }

        Ok(self.gate.passes(task, CheckStatus::Warn).await?)
    }

    async fn dispatch_running_tasks(
        &self,
        root: &CancellationToken,
        promoted: Vec<Task>,
    ) -> Result<(), SchedulerError> {
        let mut handled = HashSet::new();
        for task in promoted {
            handled.insert(task.id());
            self.dispatch(root, task);
        }

        // Tasks left running by a transient failure get another attempt.
        let running = self
            .store
            .find_tasks(&TaskFind::by_status([TaskStatus::Running]))
            .await?;
        for task in running {
            if handled.contains(&task.id()) || self.state.is_task_running(task.id()) {
                continue;
            }
            if !self.state.try_acquire_connection(
                task.instance().id,
                self.config.max_connections_per_instance,
            ) {
                continue;
            }
            handled.insert(task.id());
            self.dispatch(root, task);
        }
        Ok(())
    }

    /// Launches the executor of a running task. The caller has reserved a
    /// connection slot, which the launched execution releases on exit.
    fn dispatch(&self, root: &CancellationToken, task: Task) {
        let instance_id = task.instance().id;
        let Some(executor) = self.registry.get(task.task_type()) else {
            error!(
                task_id = %task.id(),
                task_type = %task.task_type(),
                "no executor registered for task type"
            );
            self.state.release_connection(instance_id);
            return;
        };

        let token = root.child_token();
        if !self.state.try_start_task(task.id(), token.clone()) {
            self.state.release_connection(instance_id);
            return;
        }

        let span = task_span("execute", &task);
        let scheduler = self.clone();
        tokio::spawn(
            async move {
                scheduler.execute(executor, token, task).await;
            }
            .instrument(span),
        );
    }

    async fn execute(self, executor: Arc<dyn TaskExecutor>, token: CancellationToken, task: Task) {
        let _guard = ExecutionGuard {
            state: Arc::clone(&self.state),
            progress: Arc::clone(&self.progress),
            task_id: task.id(),
            instance_id: task.instance().id,
        };

        let outcome = run_executor(executor, token.clone(), task.clone()).await;
        if token.is_cancelled() {
            debug!("task execution canceled");
            return;
        }
        if let Err(err) = self.complete(&task, outcome).await {
            error!(error = %err, "failed to record task outcome");
        }
    }

    async fn complete(&self, task: &Task, outcome: ExecutionOutcome) -> Result<(), SchedulerError> {
        let patch = match outcome {
            ExecutionOutcome::Retry(err) => {
                debug!(error = %err, code = %err.code, "transient task failure, will retry");
                return Ok(());
            }
            ExecutionOutcome::Failed(err) => {
                warn!(error = %err, code = %err.code, "task failed");
                let result = serde_json::to_string(&TaskRunResult::detail(err.message))?;
                TaskStatusPatch::single(task.id(), TaskStatus::Failed, PrincipalId::SYSTEM_BOT)
                    .with_result(err.code, result)
            }
            ExecutionOutcome::Done(run_result) => {
                let result = serde_json::to_string(&run_result)?;
                TaskStatusPatch::single(task.id(), TaskStatus::Done, PrincipalId::SYSTEM_BOT)
                    .with_result(ErrorCode::Ok, result)
            }
        };

        match self
            .patch_task_status(task, patch.expecting(TaskStatus::Running))
            .await
        {
            Err(err) if err.is_status_changed() => {
                info!(error = %err, "task left running state during execution, dropping result");
                Ok(())
            }
            result => result.map(drop),
        }
    }
}

/// Releases the running-set entry, progress entry, and connection slot of
/// one execution when it exits, including by panic.
struct ExecutionGuard {
    state: Arc<SchedulerState>,
    progress: Arc<TaskProgressBoard>,
    task_id: TaskId,
    instance_id: InstanceId,
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        self.state.finish_task(self.task_id);
        self.progress.remove(self.task_id);
        self.state.release_connection(self.instance_id);
    }
}

/// Runs one executor invocation on its own tokio task, converting a panic
/// into a terminal failure.
async fn run_executor(
    executor: Arc<dyn TaskExecutor>,
    token: CancellationToken,
    task: Task,
) -> ExecutionOutcome {
    let handle = tokio::spawn(async move { executor.run_once(&token, &task).await });
    match handle.await {
        Ok(outcome) => outcome,
        Err(join_err) => {
            let message = join_error_message(join_err);
            error!(
                panic = %message,
                backtrace = %std::backtrace::Backtrace::force_capture(),
                "recovered panic in task executor"
            );
            ExecutionOutcome::Failed(ExecutorError::internal(format!(
                "executor panicked: {message}"
            )))
        }
    }
}

fn log_tick_join_error(join_err: JoinError) {
    let panicked = join_err.is_panic();
    let message = join_error_message(join_err);
    if panicked {
        error!(
            panic = %message,
            backtrace = %std::backtrace::Backtrace::force_capture(),
            "recovered panic in task scheduler tick"
        );
    } else {
        error!(error = %message, "task scheduler tick aborted");
    }
}

/// Extracts a readable message from a failed join.
pub(crate) fn join_error_message(join_err: JoinError) -> String {
    match join_err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|message| (*message).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned()),
        Err(err) => err.to_string(),
    }
}
