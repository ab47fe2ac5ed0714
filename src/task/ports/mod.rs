//! Port contracts for task scheduling.
//!
//! Ports define infrastructure-agnostic interfaces used by the scheduler.

pub mod activity;
pub mod executor;
pub mod store;

pub use activity::{
    ActivityManager, CollaboratorError, CollaboratorResult, ExternalApprovalCanceller,
};
pub use executor::{
    CancellationSupport, ExecutionOutcome, ExecutorError, TaskCheckExecutor, TaskExecutor,
};
pub use store::{
    IssuePatch, PipelinePatch, TaskCheckRunCreate, TaskCheckRunFind, TaskCheckRunStatusPatch,
    TaskDagFind, TaskFind, TaskStatusPatch, TaskStore, TaskStoreError, TaskStoreResult,
};
