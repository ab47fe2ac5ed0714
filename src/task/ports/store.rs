//! Store port for task, pipeline, issue, and check-run records.

use crate::task::domain::{
    ApprovalPolicy, EnvironmentId, ErrorCode, Issue, IssueId, IssueStatus, PipelineId,
    PipelineStatus, Principal, PrincipalId, ProjectId, ProjectMember, ProjectRole, Pipeline, Task,
    TaskCheckRun, TaskCheckRunId, TaskCheckRunResult, TaskCheckRunStatus, TaskCheckType, TaskDag,
    TaskId, TaskStatus, WorkspaceRole,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for store operations.
pub type TaskStoreResult<T> = Result<T, TaskStoreError>;

/// Filter for [`TaskStore::find_tasks`]. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFind {
    /// Restrict to these ids.
    pub ids: Option<Vec<TaskId>>,
    /// Restrict to one pipeline.
    pub pipeline_id: Option<PipelineId>,
    /// Restrict to these statuses.
    pub status_list: Option<Vec<TaskStatus>>,
}

impl TaskFind {
    /// Matches tasks in any of `statuses`.
    #[must_use]
    pub fn by_status(statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        Self {
            status_list: Some(statuses.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Restricts the filter to one pipeline.
    #[must_use]
    pub fn in_pipeline(mut self, pipeline_id: PipelineId) -> Self {
        self.pipeline_id = Some(pipeline_id);
        self
    }
}

/// Status patch applied to one or more tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusPatch {
    /// Tasks to patch.
    pub ids: Vec<TaskId>,
    /// Principal performing the patch.
    pub updater_id: PrincipalId,
    /// New status.
    pub status: TaskStatus,
    /// Classified error code of the run.
    pub code: ErrorCode,
    /// Marshaled run result.
    pub result: Option<String>,
    /// Status every task must still hold for the patch to apply.
    pub expected_status: Option<TaskStatus>,
}

impl TaskStatusPatch {
    /// Creates a patch for a single task.
    #[must_use]
    pub fn single(task_id: TaskId, status: TaskStatus, updater_id: PrincipalId) -> Self {
        Self {
            ids: vec![task_id],
            updater_id,
            status,
            code: ErrorCode::Ok,
            result: None,
            expected_status: None,
        }
    }

    /// Applies the patch only while the tasks are still in `status`.
    #[must_use]
    pub const fn expecting(mut self, status: TaskStatus) -> Self {
        self.expected_status = Some(status);
        self
    }

    /// Attaches a run result and code.
    #[must_use]
    pub fn with_result(mut self, code: ErrorCode, result: impl Into<String>) -> Self {
        self.code = code;
        self.result = Some(result.into());
        self
    }
}

/// Filter for [`TaskStore::find_task_dag_list`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskDagFind {
    /// Edges starting at this task.
    pub from_task_id: Option<TaskId>,
    /// Edges ending at this task.
    pub to_task_id: Option<TaskId>,
}

/// Patch applied to an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuePatch {
    /// Issue to patch.
    pub id: IssueId,
    /// Principal performing the patch.
    pub updater_id: PrincipalId,
    /// New status.
    pub status: Option<IssueStatus>,
    /// New assignee.
    pub assignee_id: Option<PrincipalId>,
    /// New attention flag.
    pub assignee_need_attention: Option<bool>,
}

impl IssuePatch {
    /// Creates an empty patch for `id`.
    #[must_use]
    pub const fn new(id: IssueId, updater_id: PrincipalId) -> Self {
        Self {
            id,
            updater_id,
            status: None,
            assignee_id: None,
            assignee_need_attention: None,
        }
    }
}

/// Patch applied to a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelinePatch {
    /// Pipeline to patch.
    pub id: PipelineId,
    /// Principal performing the patch.
    pub updater_id: PrincipalId,
    /// New status.
    pub status: PipelineStatus,
}

/// Request to create a check run unless an equivalent one is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCheckRunCreate {
    /// Task under check.
    pub task_id: TaskId,
    /// Check to run.
    pub check_type: TaskCheckType,
    /// Statement under check.
    pub statement: Option<String>,
    /// Principal requesting the run.
    pub creator_id: PrincipalId,
}

/// Filter for [`TaskStore::find_task_check_runs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskCheckRunFind {
    /// Restrict to one task.
    pub task_id: Option<TaskId>,
    /// Restrict to these statuses.
    pub status_list: Option<Vec<TaskCheckRunStatus>>,
}

/// Status patch applied to a check run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCheckRunStatusPatch {
    /// Check run to patch.
    pub id: TaskCheckRunId,
    /// Principal performing the patch.
    pub updater_id: PrincipalId,
    /// New status.
    pub status: TaskCheckRunStatus,
    /// Classified failure code.
    pub code: ErrorCode,
    /// Run result.
    pub result: TaskCheckRunResult,
}

/// Durable record store consumed by the scheduler.
///
/// Each call is expected to be internally consistent; the scheduler never
/// holds a transaction open across calls.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Returns tasks matching `find`, ordered by id.
    async fn find_tasks(&self, find: &TaskFind) -> TaskStoreResult<Vec<Task>>;

    /// Returns one task, or `None` when it does not exist.
    async fn get_task(&self, id: TaskId) -> TaskStoreResult<Option<Task>>;

    /// Applies `patch` and returns the patched tasks.
    ///
    /// When `patch.expected_status` is set, the check and the write happen
    /// atomically and nothing is written if any task moved.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] when a task does not exist, and
    /// [`TaskStoreError::StatusChanged`] when a task no longer holds the
    /// expected status.
    async fn patch_task_status(&self, patch: &TaskStatusPatch) -> TaskStoreResult<Vec<Task>>;

    /// Moves every task in `ids` to `status` in one call.
    async fn batch_patch_task_status(
        &self,
        ids: &[TaskId],
        status: TaskStatus,
        updater_id: PrincipalId,
    ) -> TaskStoreResult<()>;

    /// Returns dependency edges matching `find`.
    async fn find_task_dag_list(&self, find: &TaskDagFind) -> TaskStoreResult<Vec<TaskDag>>;

    /// Returns the pipeline with its stages and current tasks.
    async fn get_pipeline(&self, id: PipelineId) -> TaskStoreResult<Option<Pipeline>>;

    /// Returns the issue owning `pipeline_id`, if the pipeline has one.
    async fn get_issue_by_pipeline_id(&self, pipeline_id: PipelineId)
    -> TaskStoreResult<Option<Issue>>;

    /// Applies `patch` and returns the updated issue.
    async fn patch_issue(&self, patch: &IssuePatch) -> TaskStoreResult<Issue>;

    /// Applies `patch` and returns the updated pipeline.
    async fn patch_pipeline(&self, patch: &PipelinePatch) -> TaskStoreResult<Pipeline>;

    /// Creates a check run unless one of the same type is already running
    /// for the task, returning the running one.
    async fn create_task_check_run_if_needed(
        &self,
        create: &TaskCheckRunCreate,
    ) -> TaskStoreResult<TaskCheckRun>;

    /// Returns check runs matching `find`, ordered by id.
    async fn find_task_check_runs(&self, find: &TaskCheckRunFind)
    -> TaskStoreResult<Vec<TaskCheckRun>>;

    /// Applies `patch` and returns the updated check run.
    async fn patch_task_check_run_status(
        &self,
        patch: &TaskCheckRunStatusPatch,
    ) -> TaskStoreResult<TaskCheckRun>;

    /// Returns the approval policy of an environment.
    async fn get_pipeline_approval_policy(
        &self,
        environment_id: EnvironmentId,
    ) -> TaskStoreResult<ApprovalPolicy>;

    /// Returns a principal, or `None` when it does not exist.
    async fn get_principal(&self, id: PrincipalId) -> TaskStoreResult<Option<Principal>>;

    /// Returns principals holding a workspace role, ordered by id.
    async fn find_principals_by_role(&self, role: WorkspaceRole)
    -> TaskStoreResult<Vec<Principal>>;

    /// Returns members of a project holding `role`, ordered by principal id.
    async fn find_project_members(
        &self,
        project_id: ProjectId,
        role: ProjectRole,
    ) -> TaskStoreResult<Vec<ProjectMember>>;
}

/// Errors returned by store implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskStoreError {
    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// A non-task record was not found.
    #[error("{kind} not found: {id}")]
    RecordNotFound {
        /// Record kind.
        kind: &'static str,
        /// Record identifier.
        id: i64,
    },

    /// The task left the status a conditional patch expected.
    #[error("task {task_id} is {actual}, expected {expected}")]
    StatusChanged {
        /// Task that moved.
        task_id: TaskId,
        /// Status the patch required.
        expected: TaskStatus,
        /// Status the task holds.
        actual: TaskStatus,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskStoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    /// Returns the error code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) | Self::RecordNotFound { .. } => ErrorCode::NotFound,
            Self::StatusChanged { .. } => ErrorCode::Conflict,
            Self::Persistence(_) => ErrorCode::Internal,
        }
    }
}
