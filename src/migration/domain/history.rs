//! Ledger rows and the queries that read them.

use super::{MigrationSource, MigrationStatus, MigrationType};
use crate::task::domain::IssueId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the migration ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationHistory {
    /// Row identifier.
    pub id: i64,
    /// Principal that created the row.
    pub created_by: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Principal that last updated the row.
    pub updated_by: String,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Release label of the service that wrote the row.
    pub release_version: String,
    /// Ledger namespace.
    pub namespace: String,
    /// Position of the row within its namespace, starting at 1.
    pub sequence: i64,
    /// Where the change originated.
    pub source: MigrationSource,
    /// Kind of row.
    pub migration_type: MigrationType,
    /// Progress of the row.
    pub status: MigrationStatus,
    /// Stored version.
    pub version: String,
    /// Human-readable description.
    pub description: String,
    /// Executed statement.
    pub statement: String,
    /// Schema after the change.
    pub schema: String,
    /// Schema before the change.
    pub schema_prev: String,
    /// Execution time in nanoseconds.
    pub execution_duration_ns: i64,
    /// Issue that requested the change.
    pub issue_id: Option<IssueId>,
    /// Opaque JSON payload.
    pub payload: String,
}

/// Filter for ledger reads. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationHistoryFind {
    /// Restrict to one row.
    pub id: Option<i64>,
    /// Restrict to one namespace.
    pub namespace: Option<String>,
    /// Restrict to one source.
    pub source: Option<MigrationSource>,
    /// Restrict to one stored version.
    pub version: Option<String>,
    /// Maximum rows to return.
    pub limit: Option<usize>,
}

impl MigrationHistoryFind {
    /// Matches every row of `namespace`.
    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    /// Restricts the filter to one stored version.
    #[must_use]
    pub fn with_version(mut self, stored_version: impl Into<String>) -> Self {
        self.version = Some(stored_version.into());
        self
    }

    /// Caps the number of rows returned.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns whether `row` satisfies every set field.
    #[must_use]
    pub fn matches(&self, row: &MigrationHistory) -> bool {
        self.id.is_none_or(|id| id == row.id)
            && self
                .namespace
                .as_deref()
                .is_none_or(|namespace| namespace == row.namespace)
            && self.source.is_none_or(|source| source == row.source)
            && self
                .version
                .as_deref()
                .is_none_or(|version| version == row.version)
    }
}

/// A row about to be recorded as `Pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMigration {
    /// Principal creating the row.
    pub creator: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Release label.
    pub release_version: String,
    /// Ledger namespace.
    pub namespace: String,
    /// Sequence assigned to the row.
    pub sequence: i64,
    /// Where the change originated.
    pub source: MigrationSource,
    /// Kind of row.
    pub migration_type: MigrationType,
    /// Stored version.
    pub version: String,
    /// Human-readable description.
    pub description: String,
    /// Statement about to run.
    pub statement: String,
    /// Schema before the change, recorded as both images until the row is
    /// finalized.
    pub schema_prev: String,
    /// Requesting issue.
    pub issue_id: Option<IssueId>,
    /// Opaque JSON payload.
    pub payload: String,
}
