//! Closed set of task types and their static capabilities.

use super::{Engine, ParseTaskEnumError, TaskCheckType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of work a task performs.
///
/// The cancellation note on each variant describes what a `Canceled` status
/// means for a task of that type once it has started running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Creates a database. `Canceled` means "will not be retried".
    DatabaseCreate,
    /// Applies a schema migration. `Canceled` means "will not be retried".
    SchemaUpdate,
    /// Copies data into a shadow table with gh-ost. `Canceled` means
    /// "stopped": the tool is aborted.
    SchemaUpdateGhostSync,
    /// Swaps the gh-ost shadow table into place. `Canceled` means "will not
    /// be retried".
    SchemaUpdateGhostCutover,
    /// Applies a data change. `Canceled` means "will not be retried".
    DataUpdate,
    /// Dumps a database into backup storage. `Canceled` means "will not be
    /// retried".
    DatabaseBackup,
    /// Restores a backup into a database. `Canceled` means "will not be
    /// retried".
    PitrRestore,
    /// Swaps a restored database into place. `Canceled` means "will not be
    /// retried".
    PitrCutover,
}

impl TaskType {
    /// Every task type, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::DatabaseCreate,
        Self::SchemaUpdate,
        Self::SchemaUpdateGhostSync,
        Self::SchemaUpdateGhostCutover,
        Self::DataUpdate,
        Self::DatabaseBackup,
        Self::PitrRestore,
        Self::PitrCutover,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DatabaseCreate => "database_create",
            Self::SchemaUpdate => "schema_update",
            Self::SchemaUpdateGhostSync => "schema_update_ghost_sync",
            Self::SchemaUpdateGhostCutover => "schema_update_ghost_cutover",
            Self::DataUpdate => "data_update",
            Self::DatabaseBackup => "database_backup",
            Self::PitrRestore => "pitr_restore",
            Self::PitrCutover => "pitr_cutover",
        }
    }

    /// Returns the check types that must pass before a task of this type
    /// targeting `engine` may be approved or promoted.
    ///
    /// Only the schema/data-update family is gated.
    #[must_use]
    pub fn required_checks(self, engine: Engine) -> Vec<TaskCheckType> {
        if !matches!(
            self,
            Self::SchemaUpdate | Self::SchemaUpdateGhostSync | Self::DataUpdate
        ) {
            return Vec::new();
        }

        let mut checks = vec![
            TaskCheckType::DatabaseConnect,
            TaskCheckType::InstanceMigrationSchema,
        ];
        if engine.supports_syntax_check() {
            checks.push(TaskCheckType::StatementSyntax);
        }
        if engine.supports_sql_review() {
            checks.push(TaskCheckType::StatementAdvise);
        }
        if engine.supports_statement_type_check() {
            checks.push(TaskCheckType::StatementType);
        }
        if self == Self::SchemaUpdateGhostSync {
            checks.push(TaskCheckType::GhostSync);
        }
        checks
    }
}

impl TryFrom<&str> for TaskType {
    type Error = ParseTaskEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|task_type| task_type.as_str() == normalized)
            .ok_or_else(|| ParseTaskEnumError::new("task type", value))
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
