//! Task aggregate and the references it carries.

use super::{
    DatabaseId, Engine, EnvironmentId, InstanceId, PipelineId, PrincipalId, ProjectId, StageId,
    TaskDomainError, TaskId, TaskPayload, TaskStatus, TaskType,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of the instance a task targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRef {
    /// Instance identifier.
    pub id: InstanceId,
    /// Human-readable instance name.
    pub name: String,
    /// Environment the instance belongs to.
    pub environment_id: EnvironmentId,
    /// Engine running on the instance.
    pub engine: Engine,
    /// Whether the instance has been archived.
    pub archived: bool,
}

/// Snapshot of the database a task targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRef {
    /// Database identifier.
    pub id: DatabaseId,
    /// Database name on the instance.
    pub name: String,
    /// Project owning the database.
    pub project_id: ProjectId,
}

/// Task aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    name: String,
    task_type: TaskType,
    status: TaskStatus,
    pipeline_id: PipelineId,
    stage_id: StageId,
    instance: InstanceRef,
    database: Option<DatabaseRef>,
    payload: TaskPayload,
    blocked_by: Vec<TaskId>,
    earliest_allowed_at: Option<DateTime<Utc>>,
    creator_id: PrincipalId,
    updater_id: PrincipalId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for constructing or reconstructing a task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskData {
    /// Task identifier.
    pub id: TaskId,
    /// Human-readable task name.
    pub name: String,
    /// Task type.
    pub task_type: TaskType,
    /// Current status.
    pub status: TaskStatus,
    /// Owning pipeline.
    pub pipeline_id: PipelineId,
    /// Owning stage.
    pub stage_id: StageId,
    /// Target instance.
    pub instance: InstanceRef,
    /// Target database, if any.
    pub database: Option<DatabaseRef>,
    /// Type-specific payload.
    pub payload: TaskPayload,
    /// Tasks that must be `Done` before this task is promoted.
    pub blocked_by: Vec<TaskId>,
    /// Earliest time the task may start.
    pub earliest_allowed_at: Option<DateTime<Utc>>,
    /// Principal that created the task.
    pub creator_id: PrincipalId,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl TaskData {
    /// Creates task data in `PendingApproval` with no blockers or schedule.
    #[must_use]
    pub fn new(
        id: TaskId,
        name: impl Into<String>,
        pipeline_id: PipelineId,
        stage_id: StageId,
        instance: InstanceRef,
        payload: TaskPayload,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            task_type: payload.task_type(),
            status: TaskStatus::PendingApproval,
            pipeline_id,
            stage_id,
            instance,
            database: None,
            payload,
            blocked_by: Vec::new(),
            earliest_allowed_at: None,
            creator_id: PrincipalId::SYSTEM_BOT,
            created_at,
        }
    }

    /// Sets the initial status.
    #[must_use]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the target database.
    #[must_use]
    pub fn with_database(mut self, database: DatabaseRef) -> Self {
        self.database = Some(database);
        self
    }

    /// Sets the blocking task list.
    #[must_use]
    pub fn with_blocked_by(mut self, blocked_by: impl IntoIterator<Item = TaskId>) -> Self {
        self.blocked_by = blocked_by.into_iter().collect();
        self
    }

    /// Sets the earliest allowed start time.
    #[must_use]
    pub fn with_earliest_allowed_at(mut self, at: DateTime<Utc>) -> Self {
        self.earliest_allowed_at = Some(at);
        self
    }

    /// Sets the creating principal.
    #[must_use]
    pub fn with_creator(mut self, creator_id: PrincipalId) -> Self {
        self.creator_id = creator_id;
        self
    }
}

impl Task {
    /// Builds a task from its data.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidPayload`] when the payload variant
    /// does not belong to the declared task type.
    pub fn from_data(data: TaskData) -> Result<Self, TaskDomainError> {
        if data.payload.task_type() != data.task_type {
            return Err(TaskDomainError::InvalidPayload {
                task_id: data.id,
                reason: format!(
                    "payload for {} attached to a {} task",
                    data.payload.task_type(),
                    data.task_type
                ),
            });
        }

        Ok(Self {
            id: data.id,
            name: data.name,
            task_type: data.task_type,
            status: data.status,
            pipeline_id: data.pipeline_id,
            stage_id: data.stage_id,
            instance: data.instance,
            database: data.database,
            payload: data.payload,
            blocked_by: data.blocked_by,
            earliest_allowed_at: data.earliest_allowed_at,
            creator_id: data.creator_id,
            updater_id: data.creator_id,
            created_at: data.created_at,
            updated_at: data.created_at,
        })
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the task type.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        self.task_type
    }

    /// Returns the current status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the owning pipeline.
    #[must_use]
    pub const fn pipeline_id(&self) -> PipelineId {
        self.pipeline_id
    }

    /// Returns the owning stage.
    #[must_use]
    pub const fn stage_id(&self) -> StageId {
        self.stage_id
    }

    /// Returns the target instance.
    #[must_use]
    pub const fn instance(&self) -> &InstanceRef {
        &self.instance
    }

    /// Returns the target database, if any.
    #[must_use]
    pub const fn database(&self) -> Option<&DatabaseRef> {
        self.database.as_ref()
    }

    /// Returns the type-specific payload.
    #[must_use]
    pub const fn payload(&self) -> &TaskPayload {
        &self.payload
    }

    /// Returns the tasks blocking promotion.
    #[must_use]
    pub fn blocked_by(&self) -> &[TaskId] {
        &self.blocked_by
    }

    /// Returns the earliest allowed start time.
    #[must_use]
    pub const fn earliest_allowed_at(&self) -> Option<DateTime<Utc>> {
        self.earliest_allowed_at
    }

    /// Returns the creating principal.
    #[must_use]
    pub const fn creator_id(&self) -> PrincipalId {
        self.creator_id
    }

    /// Returns the principal that last changed the task.
    #[must_use]
    pub const fn updater_id(&self) -> PrincipalId {
        self.updater_id
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Checks that the state machine allows moving this task to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStatusTransition`] when `target` is
    /// not reachable from the current status.
    pub fn ensure_transition(&self, target: TaskStatus) -> Result<(), TaskDomainError> {
        if self.status.can_transition_to(target) {
            return Ok(());
        }
        Err(TaskDomainError::InvalidStatusTransition {
            task_id: self.id,
            from: self.status,
            to: target,
        })
    }

    /// Applies a status change that has already been validated.
    ///
    /// Store adapters call this when persisting a patch. Batch cascade
    /// patches apply it without a transition check.
    pub const fn record_status(
        &mut self,
        status: TaskStatus,
        updater_id: PrincipalId,
        at: DateTime<Utc>,
    ) {
        self.status = status;
        self.updater_id = updater_id;
        self.updated_at = at;
    }
}
