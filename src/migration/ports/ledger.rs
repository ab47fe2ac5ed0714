//! Ledger port for migration history rows.

use crate::migration::domain::{
    MigrationError, MigrationHistory, MigrationHistoryFind, PendingMigration,
};
use crate::task::domain::ErrorCode;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger persistence contract.
///
/// Each call is atomic on its own. The protocol in
/// [`crate::migration::services::MigrationService`] orders them.
#[async_trait]
pub trait MigrationLedger: Send + Sync {
    /// Returns whether the ledger table still has to be created.
    async fn needs_setup(&self) -> LedgerResult<bool>;

    /// Returns rows matching `find`, most recent first.
    async fn find_migration_history_list(
        &self,
        find: &MigrationHistoryFind,
    ) -> LedgerResult<Vec<MigrationHistory>>;

    /// Returns the largest sequence in `namespace`, or `0` when it is empty.
    /// With `baseline_only`, only `Baseline` and `Branch` rows count.
    async fn find_largest_sequence(
        &self,
        namespace: &str,
        baseline_only: bool,
    ) -> LedgerResult<i64>;

    /// Returns the largest stored version recorded since the last
    /// `Baseline` or `Branch` row of `namespace`.
    async fn find_largest_version_since_baseline(
        &self,
        namespace: &str,
    ) -> LedgerResult<Option<String>>;

    /// Records a `Pending` row and returns its id.
    async fn insert_pending_history(&self, pending: &PendingMigration) -> LedgerResult<i64>;

    /// Marks a row `Done` with its duration and post-image.
    async fn update_history_as_done(
        &self,
        id: i64,
        duration_ns: i64,
        updated_schema: &str,
        updated_at: DateTime<Utc>,
    ) -> LedgerResult<()>;

    /// Marks a row `Failed` with its duration.
    async fn update_history_as_failed(
        &self,
        id: i64,
        duration_ns: i64,
        updated_at: DateTime<Utc>,
    ) -> LedgerResult<()>;
}

/// Errors returned by ledger implementations.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// The addressed row does not exist.
    #[error("migration history {0} not found")]
    NotFound(i64),

    /// A stored row could not be decoded.
    #[error(transparent)]
    Corrupt(#[from] MigrationError),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl LedgerError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    /// Returns the error code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Corrupt(_) | Self::Persistence(_) => ErrorCode::Internal,
        }
    }
}
