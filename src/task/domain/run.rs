//! Task run results and progress.

use super::{ErrorCode, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result payload stored when a task run finishes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskRunResult {
    /// Human-readable detail.
    pub detail: String,
    /// Migration ledger row written by the run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_id: Option<i64>,
    /// Schema version applied by the run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl TaskRunResult {
    /// Creates a result with only a detail message.
    pub fn detail(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            migration_id: None,
            version: None,
        }
    }

    /// Attaches the migration ledger row and version.
    #[must_use]
    pub fn with_migration(mut self, migration_id: i64, version: impl Into<String>) -> Self {
        self.migration_id = Some(migration_id);
        self.version = Some(version.into());
        self
    }
}

/// Status patch outcome recorded by the store for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRunRecord {
    /// Status the task moved to.
    pub status: TaskStatus,
    /// Classified error code.
    pub code: ErrorCode,
    /// Marshaled result payload.
    pub result: Option<String>,
    /// Time of the patch.
    pub recorded_at: DateTime<Utc>,
}

/// Progress published by a long-running executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    /// Total units of work.
    pub total_unit: u64,
    /// Units completed so far.
    pub completed_unit: u64,
    /// Time of the latest update.
    pub updated_at: DateTime<Utc>,
}
