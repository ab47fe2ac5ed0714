//! Activity records emitted for status transitions and cascades.

use super::{Issue, IssueStatus, PrincipalId, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    /// A task changed status.
    TaskStatusUpdate,
    /// An issue changed status.
    IssueStatusUpdate,
    /// Dependents of a canceled task were canceled.
    TaskDependentsCanceled,
}

/// Severity of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    /// Informational.
    Info,
    /// Needs attention.
    Warn,
    /// Reports a failure.
    Error,
}

/// Request to record an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityCreate {
    /// Principal the activity is attributed to.
    pub creator_id: PrincipalId,
    /// Identifier of the containing issue or pipeline.
    pub container_id: i64,
    /// Activity kind.
    pub activity_type: ActivityType,
    /// Severity.
    pub level: ActivityLevel,
    /// Free-form comment.
    pub comment: String,
    /// Kind-specific payload.
    pub payload: serde_json::Value,
}

/// Context passed alongside an activity, used by notification collaborators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityMetadata {
    /// Issue the activity belongs to, if any.
    pub issue: Option<Issue>,
}

/// Recorded activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Activity identifier.
    pub id: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Recorded request.
    pub create: ActivityCreate,
}

/// Payload of [`ActivityType::TaskStatusUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusUpdatePayload {
    /// Task that changed.
    pub task_id: TaskId,
    /// Previous status.
    pub old_status: TaskStatus,
    /// New status.
    pub new_status: TaskStatus,
    /// Issue title, empty when the pipeline has no issue.
    pub issue_name: String,
    /// Task name.
    pub task_name: String,
}

/// Payload of [`ActivityType::IssueStatusUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStatusUpdatePayload {
    /// Previous status.
    pub old_status: IssueStatus,
    /// New status.
    pub new_status: IssueStatus,
    /// Issue title.
    pub issue_name: String,
}

/// Payload of [`ActivityType::TaskDependentsCanceled`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDependentsCanceledPayload {
    /// Task whose cancellation cascaded.
    pub task_id: TaskId,
    /// Dependents moved to `Canceled`.
    pub canceled_task_ids: Vec<TaskId>,
}
