//! Ledger protocol errors.

use crate::task::domain::{ErrorCode, IssueId};
use thiserror::Error;

/// Errors raised while validating or recording a migration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MigrationError {
    /// The submitted version cannot be encoded.
    #[error("invalid version {version:?}: {reason}")]
    InvalidVersion {
        /// Submitted version.
        version: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A stored version cannot be decoded.
    #[error("invalid stored version {stored:?}: {reason}")]
    InvalidStoredVersion {
        /// Stored version text.
        stored: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A stored enumeration value is unknown.
    #[error("unknown {kind}: {value:?}")]
    UnknownValue {
        /// Enumeration name.
        kind: &'static str,
        /// Stored text.
        value: String,
    },

    /// The same version was already applied by the same issue.
    #[error("database {database:?} has already applied version {version}")]
    AlreadyApplied {
        /// Existing ledger row.
        history_id: i64,
        /// Target database.
        database: String,
        /// Applied version.
        version: String,
    },

    /// The same version was already applied by another issue.
    #[error("database {database:?} has already applied version {version} by issue {issue}")]
    AppliedByOtherIssue {
        /// Target database.
        database: String,
        /// Applied version.
        version: String,
        /// Issue that applied it, or `none`.
        issue: String,
    },

    /// A previous attempt of the version is still pending.
    #[error("database {database:?} version {version} migration is already in progress")]
    InProgress {
        /// Target database.
        database: String,
        /// Pending version.
        version: String,
    },

    /// A previous attempt of the version failed.
    #[error(
        "database {database:?} version {version} migration has failed, check the database \
         and start a new migration with a new version"
    )]
    PreviouslyFailed {
        /// Target database.
        database: String,
        /// Failed version.
        version: String,
    },

    /// A newer or equal version was applied since the last baseline.
    #[error("database {database:?} has already applied version {applied} which >= {version}")]
    OutOfOrder {
        /// Target database.
        database: String,
        /// Largest stored version since the last baseline.
        applied: String,
        /// Submitted stored version.
        version: String,
    },

    /// The ledger table does not exist on the instance.
    #[error("migration schema is missing on instance {instance}")]
    SchemaMissing {
        /// Instance name.
        instance: String,
    },
}

impl MigrationError {
    /// Formats an optional issue id for [`Self::AppliedByOtherIssue`].
    #[must_use]
    pub fn describe_issue(issue_id: Option<IssueId>) -> String {
        issue_id.map_or_else(|| "none".to_owned(), |id| id.to_string())
    }

    /// Returns the error code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidVersion { .. }
            | Self::InvalidStoredVersion { .. }
            | Self::UnknownValue { .. } => ErrorCode::Invalid,
            Self::AlreadyApplied { .. } => ErrorCode::MigrationAlreadyApplied,
            Self::AppliedByOtherIssue { .. } | Self::PreviouslyFailed { .. } => {
                ErrorCode::MigrationFailed
            }
            Self::InProgress { .. } => ErrorCode::MigrationPending,
            Self::OutOfOrder { .. } => ErrorCode::MigrationOutOfOrder,
            Self::SchemaMissing { .. } => ErrorCode::MigrationSchemaMissing,
        }
    }
}
