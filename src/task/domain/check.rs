//! Task check runs and their results.

use super::{ErrorCode, ParseTaskEnumError, TaskCheckRunId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named pre-execution check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCheckType {
    /// The target database accepts connections.
    DatabaseConnect,
    /// The instance has the migration ledger set up.
    InstanceMigrationSchema,
    /// The statement parses.
    StatementSyntax,
    /// The statement passes SQL review rules.
    StatementAdvise,
    /// The statement type matches the task type.
    StatementType,
    /// gh-ost accepts the migration in a dry run.
    GhostSync,
}

impl TaskCheckType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DatabaseConnect => "database_connect",
            Self::InstanceMigrationSchema => "instance_migration_schema",
            Self::StatementSyntax => "statement_syntax",
            Self::StatementAdvise => "statement_advise",
            Self::StatementType => "statement_type",
            Self::GhostSync => "ghost_sync",
        }
    }
}

impl TryFrom<&str> for TaskCheckType {
    type Error = ParseTaskEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "database_connect" => Ok(Self::DatabaseConnect),
            "instance_migration_schema" => Ok(Self::InstanceMigrationSchema),
            "statement_syntax" => Ok(Self::StatementSyntax),
            "statement_advise" => Ok(Self::StatementAdvise),
            "statement_type" => Ok(Self::StatementType),
            "ghost_sync" => Ok(Self::GhostSync),
            _ => Err(ParseTaskEnumError::new("task check type", value)),
        }
    }
}

impl fmt::Display for TaskCheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCheckRunStatus {
    /// Queued or executing.
    Running,
    /// Produced a result list.
    Done,
    /// Could not produce a result list.
    Failed,
}

/// Severity of one check result item, ordered `Success < Warn < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// Nothing to report.
    Success,
    /// Acceptable but worth attention.
    Warn,
    /// Blocking problem.
    Error,
}

impl CheckStatus {
    /// Returns whether this severity is acceptable under `floor`.
    ///
    /// A `Warn` floor admits `Success` and `Warn`; a `Success` floor admits
    /// only `Success`.
    #[must_use]
    pub fn meets(self, floor: Self) -> bool {
        self <= floor
    }
}

/// Source of a check result item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckNamespace {
    /// Produced by the scheduler's own checks.
    Core,
    /// Produced by the SQL advisor.
    Advisor,
}

/// One item in a check run's result list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Severity.
    pub status: CheckStatus,
    /// Producer of the item.
    pub namespace: CheckNamespace,
    /// Machine-readable code.
    pub code: i32,
    /// Short summary.
    pub title: String,
    /// Details.
    pub content: String,
}

impl CheckResult {
    /// Creates a core result item with code zero.
    #[must_use]
    pub fn core(status: CheckStatus, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            status,
            namespace: CheckNamespace::Core,
            code: 0,
            title: title.into(),
            content: content.into(),
        }
    }

    /// Creates a core error item carrying `code`.
    #[must_use]
    pub fn core_error(
        code: ErrorCode,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            code: code.as_i32(),
            ..Self::core(CheckStatus::Error, title, content)
        }
    }
}

/// Outcome stored on a finished check run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskCheckRunResult {
    /// Failure detail, empty for successful runs.
    #[serde(default)]
    pub detail: String,
    /// Result items.
    #[serde(default)]
    pub results: Vec<CheckResult>,
}

/// One evaluation of a check for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCheckRun {
    /// Run identifier, increasing with creation order.
    pub id: TaskCheckRunId,
    /// Task under check.
    pub task_id: TaskId,
    /// Check performed.
    pub check_type: TaskCheckType,
    /// Run status.
    pub status: TaskCheckRunStatus,
    /// Classified failure code for `Failed` runs.
    pub code: ErrorCode,
    /// Result, present once the run finished.
    pub result: Option<TaskCheckRunResult>,
    /// Statement under check, if any.
    pub statement: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Latest update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TaskCheckRun {
    /// Returns whether every result item meets `floor`.
    ///
    /// Runs that failed or have no result never pass.
    #[must_use]
    pub fn passes(&self, floor: CheckStatus) -> bool {
        if self.status != TaskCheckRunStatus::Done {
            return false;
        }
        self.result.as_ref().is_some_and(|result| {
            result
                .results
                .iter()
                .all(|item| item.status.meets(floor))
        })
    }
}
