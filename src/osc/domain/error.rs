//! Errors raised while coordinating a gh-ost migration.

use crate::task::{
    domain::{ErrorCode, TaskId},
    ports::ExecutorError,
};
use thiserror::Error;

/// Result type for gh-ost coordination.
pub type GhostResult<T> = Result<T, GhostError>;

/// Failures of the gh-ost tool or of the sync/cutover hand-off.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GhostError {
    /// The task does not carry a gh-ost sync payload.
    #[error("task {0} is not a gh-ost sync task")]
    NotGhostSync(TaskId),
    /// The task has no target database.
    #[error("task {0} has no target database")]
    MissingDatabase(TaskId),
    /// No sync task points at the cutover task.
    #[error("no sync task linked to cutover task {0}")]
    NoSyncTask(TaskId),
    /// The sync task already parked a migration.
    #[error("shared state already exists for sync task {0}")]
    SharedStateExists(TaskId),
    /// Nothing is parked for the sync task.
    #[error("shared state not found for sync task {0}")]
    SharedStateNotFound(TaskId),
    /// The tool's outcome was already awaited.
    #[error("gh-ost outcome already consumed")]
    OutcomeConsumed,
    /// The tool stopped without reporting an outcome.
    #[error("gh-ost exited without reporting an outcome")]
    ToolExited,
    /// The tool was aborted through its panic-abort channel.
    #[error("gh-ost aborted: {0}")]
    Aborted(String),
    /// The tool reported a failure.
    #[error("gh-ost failed: {0}")]
    Tool(String),
    /// The dry run rejected the migration.
    #[error("gh-ost dry run failed: {0}")]
    DryRun(String),
    /// The dry run panicked.
    #[error("gh-ost dry run panicked: {0}")]
    DryRunPanicked(String),
}

impl GhostError {
    /// Returns the error code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotGhostSync(_) | Self::MissingDatabase(_) | Self::NoSyncTask(_) => {
                ErrorCode::Invalid
            }
            Self::SharedStateExists(_) => ErrorCode::Conflict,
            Self::SharedStateNotFound(_) => ErrorCode::NotFound,
            Self::OutcomeConsumed
            | Self::ToolExited
            | Self::Aborted(_)
            | Self::Tool(_)
            | Self::DryRun(_)
            | Self::DryRunPanicked(_) => ErrorCode::Internal,
        }
    }
}

impl From<GhostError> for ExecutorError {
    fn from(err: GhostError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}
