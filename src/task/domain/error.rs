//! Error types for task domain validation and parsing.

use super::{TaskId, TaskStatus, TaskType};
use thiserror::Error;

/// Errors returned while validating task state changes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The requested status change is not in the transition table.
    #[error("invalid task status transition for {task_id}: {from} -> {to}")]
    InvalidStatusTransition {
        /// Task whose transition was rejected.
        task_id: TaskId,
        /// Current task status.
        from: TaskStatus,
        /// Requested target status.
        to: TaskStatus,
    },

    /// Cancellation was requested for a task type that cannot be stopped.
    #[error("cancellation is not implemented for task type {task_type} (task {task_id})")]
    CancellationNotImplemented {
        /// Task whose cancellation was rejected.
        task_id: TaskId,
        /// Type of the task.
        task_type: TaskType,
    },

    /// The task payload does not match its type or is malformed.
    #[error("invalid payload for task {task_id}: {reason}")]
    InvalidPayload {
        /// Task carrying the payload.
        task_id: TaskId,
        /// Description of the defect.
        reason: String,
    },
}

/// Error returned while parsing persisted task enums.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseTaskEnumError {
    /// Name of the enum being parsed.
    pub kind: &'static str,
    /// Raw value that could not be parsed.
    pub value: String,
}

impl ParseTaskEnumError {
    /// Creates a parse error for the named enum.
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
