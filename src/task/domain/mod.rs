//! Domain model for task scheduling.
//!
//! Tasks, their containing pipelines and issues, the task status state
//! machine, check runs, and the activities emitted on change. Nothing in
//! this module performs I/O.

mod activity;
mod check;
mod dag;
mod engine;
mod error;
mod error_code;
mod ids;
mod payload;
mod pipeline;
mod policy;
mod run;
mod status;
mod task;
mod task_type;

pub use activity::{
    Activity, ActivityCreate, ActivityLevel, ActivityMetadata, ActivityType,
    IssueStatusUpdatePayload, TaskDependentsCanceledPayload, TaskStatusUpdatePayload,
};
pub use check::{
    CheckNamespace, CheckResult, CheckStatus, TaskCheckRun, TaskCheckRunResult,
    TaskCheckRunStatus, TaskCheckType,
};
pub use dag::{DependencyGraph, TaskDagCycle};
pub use engine::Engine;
pub use error::{ParseTaskEnumError, TaskDomainError};
pub use error_code::ErrorCode;
pub use ids::{
    DatabaseId, EnvironmentId, InstanceId, IssueId, PipelineId, PrincipalId, ProjectId, StageId,
    TaskCheckRunId, TaskId,
};
pub use payload::{
    BackupPayload, DatabaseCreatePayload, GhostSyncPayload, MigrationPayload, PitrCutoverPayload,
    PitrRestorePayload, TaskPayload,
};
pub use pipeline::{
    Issue, IssueStatus, IssueWorkflow, Pipeline, PipelineStatus, Stage, TaskDag,
};
pub use policy::{
    ApprovalPolicy, ApprovalValue, AssigneeGroup, Principal, ProjectMember, ProjectRole,
    WorkspaceRole,
};
pub use run::{TaskProgress, TaskRunRecord, TaskRunResult};
pub use status::TaskStatus;
pub use task::{DatabaseRef, InstanceRef, Task, TaskData};
pub use task_type::TaskType;
