//! Notification collaborator ports: activities and external approvals.

use crate::task::domain::{Activity, ActivityCreate, ActivityMetadata, IssueId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for collaborator operations.
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Records activities for status transitions and cascades.
#[async_trait]
pub trait ActivityManager: Send + Sync {
    /// Records one activity.
    async fn create_activity(
        &self,
        create: ActivityCreate,
        metadata: ActivityMetadata,
    ) -> CollaboratorResult<Activity>;
}

/// Cancels approval requests raised in external systems.
#[async_trait]
pub trait ExternalApprovalCanceller: Send + Sync {
    /// Cancels any pending external approval for `issue_id`.
    async fn cancel_external_approval(&self, issue_id: IssueId, reason: &str)
    -> CollaboratorResult<()>;
}

/// Errors returned by notification collaborators.
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    /// The collaborator rejected the request.
    #[error("collaborator rejected request: {0}")]
    Rejected(String),

    /// Transport or persistence failure.
    #[error("collaborator unavailable: {0}")]
    Unavailable(Arc<dyn std::error::Error + Send + Sync>),
}

impl CollaboratorError {
    /// Wraps a transport or persistence error.
    pub fn unavailable(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unavailable(Arc::new(err))
    }
}
