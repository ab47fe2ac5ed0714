//! Executor ports invoked by the schedulers.

use crate::task::{
    domain::{CheckResult, ErrorCode, Task, TaskCheckRun, TaskRunResult},
    ports::TaskStoreError,
};
use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Whether an executor stops when its cancellation token fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CancellationSupport {
    /// The executor observes the token at its blocking points and aborts.
    Cooperative,
    /// The executor runs to completion; cancellation only prevents retries.
    #[default]
    Unsupported,
}

/// Outcome of one executor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Finished successfully; the task moves to `Done`.
    Done(TaskRunResult),
    /// Finished with an error; the task moves to `Failed`.
    Failed(ExecutorError),
    /// Hit a transient error before capturing any state; the task stays
    /// `Running` and is invoked again on a later tick.
    Retry(ExecutorError),
}

impl ExecutionOutcome {
    /// Returns whether the outcome finalizes the task.
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        !matches!(self, Self::Retry(_))
    }
}

impl From<Result<TaskRunResult, ExecutorError>> for ExecutionOutcome {
    fn from(result: Result<TaskRunResult, ExecutorError>) -> Self {
        match result {
            Ok(run_result) => Self::Done(run_result),
            Err(err) => Self::Failed(err),
        }
    }
}

/// Structured executor failure carrying its classified code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutorError {
    /// Classified error code.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

impl ExecutorError {
    /// Creates an error with an explicit code.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates an [`ErrorCode::Internal`] error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Creates an [`ErrorCode::Invalid`] error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Invalid, message)
    }

    /// Creates the error reported when the task's token fired.
    #[must_use]
    pub fn canceled() -> Self {
        Self::internal("task execution canceled")
    }
}

impl From<TaskStoreError> for ExecutorError {
    fn from(err: TaskStoreError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

/// Executes tasks of one type.
///
/// Executors never patch the task's own status; the scheduler does.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Returns how the executor reacts to cancellation.
    fn cancellation(&self) -> CancellationSupport {
        CancellationSupport::Unsupported
    }

    /// Runs the task once.
    async fn run_once(&self, ctx: &CancellationToken, task: &Task) -> ExecutionOutcome;

    /// Frees what the executor holds for `task` after it was canceled,
    /// whether or not an execution was live.
    ///
    /// # Errors
    ///
    /// Returns the failure that left the resources held.
    async fn release(&self, _task: &Task) -> Result<(), ExecutorError> {
        Ok(())
    }
}

/// Executes one kind of task check.
#[async_trait]
pub trait TaskCheckExecutor: Send + Sync {
    /// Evaluates `check_run` for `task` and returns the result items.
    async fn run(
        &self,
        ctx: &CancellationToken,
        check_run: &TaskCheckRun,
        task: &Task,
    ) -> Result<Vec<CheckResult>, ExecutorError>;
}
