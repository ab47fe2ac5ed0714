//! Pipeline, stage, and issue containment hierarchy.

use super::{
    EnvironmentId, IssueId, PipelineId, PrincipalId, ProjectId, StageId, Task, TaskId, TaskStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate status shared by pipelines and issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Work remains.
    Open,
    /// Every task finished successfully.
    Done,
    /// Abandoned before finishing.
    Canceled,
}

impl PipelineStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Done => "done",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issues use the same status set as their pipeline.
pub type IssueStatus = PipelineStatus;

/// Stage of a pipeline, with its tasks as currently stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Stage identifier.
    pub id: StageId,
    /// Stage name.
    pub name: String,
    /// Environment the stage deploys to.
    pub environment_id: EnvironmentId,
    /// Tasks in the stage, ordered by id.
    pub tasks: Vec<Task>,
}

impl Stage {
    /// Returns whether every task in the stage is `Done`.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.tasks.iter().all(|task| task.status() == TaskStatus::Done)
    }
}

/// Pipeline with its stages as currently stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline identifier.
    pub id: PipelineId,
    /// Pipeline name.
    pub name: String,
    /// Aggregate status.
    pub status: PipelineStatus,
    /// Stages in rollout order.
    pub stages: Vec<Stage>,
}

impl Pipeline {
    /// Returns every task in rollout order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.stages.iter().flat_map(|stage| stage.tasks.iter())
    }

    /// Returns whether every task is `Done`.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.tasks().all(|task| task.status() == TaskStatus::Done)
    }

    /// Returns the stage with the given id.
    #[must_use]
    pub fn stage(&self, stage_id: StageId) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.id == stage_id)
    }

    /// Returns the first stage that still has a task not `Done`.
    #[must_use]
    pub fn active_stage(&self) -> Option<&Stage> {
        self.stages.iter().find(|stage| !stage.is_done())
    }
}

/// How an issue moves through review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueWorkflow {
    /// Driven from the console.
    Ui,
    /// Driven from a version-control push.
    Vcs,
}

/// Change request owning one pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Issue identifier.
    pub id: IssueId,
    /// Issue title.
    pub name: String,
    /// Aggregate status.
    pub status: IssueStatus,
    /// Pipeline implementing the issue.
    pub pipeline_id: PipelineId,
    /// Project owning the issue.
    pub project_id: ProjectId,
    /// Principal responsible for approving the active stage.
    pub assignee_id: PrincipalId,
    /// Whether the assignee has outstanding work on the issue.
    pub assignee_need_attention: bool,
    /// Review workflow.
    pub workflow: IssueWorkflow,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Directed dependency edge: `to_task_id` starts only after `from_task_id`
/// finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskDag {
    /// Upstream task.
    pub from_task_id: TaskId,
    /// Downstream task.
    pub to_task_id: TaskId,
}
