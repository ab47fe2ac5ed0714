//! Type-specific task payloads.

use super::TaskType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload shared by statement-executing tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPayload {
    /// Statement to execute.
    pub statement: String,
    /// Schema version recorded in the migration ledger.
    pub schema_version: String,
    /// Whether `schema_version` is a semantic version.
    #[serde(default)]
    pub use_semantic_version: bool,
    /// Suffix appended to semantic versions in the ledger.
    #[serde(default)]
    pub semantic_version_suffix: String,
    /// Re-run an existing pending or failed ledger row.
    #[serde(default)]
    pub force: bool,
}

impl MigrationPayload {
    /// Creates a non-semantic payload.
    pub fn new(statement: impl Into<String>, schema_version: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            schema_version: schema_version.into(),
            use_semantic_version: false,
            semantic_version_suffix: String::new(),
            force: false,
        }
    }
}

/// Payload of a database-create task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseCreatePayload {
    /// Name of the database to create.
    pub database_name: String,
    /// Creation statement.
    pub statement: String,
    /// Schema version recorded in the migration ledger.
    pub schema_version: String,
}

/// Payload of a gh-ost sync task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GhostSyncPayload {
    /// Migration statement, recorded in the ledger at cutover.
    pub statement: String,
    /// Schema version recorded in the migration ledger.
    pub schema_version: String,
    /// Table being altered.
    pub table_name: String,
    /// `ALTER TABLE` clause handed to gh-ost.
    pub alter_statement: String,
}

/// Payload of a database backup task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupPayload {
    /// Name the backup is stored under.
    pub backup_name: String,
}

/// Payload of a point-in-time restore task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitrRestorePayload {
    /// Backup to restore from.
    #[serde(default)]
    pub backup_name: Option<String>,
    /// Point in time to restore to.
    #[serde(default)]
    pub point_in_time: Option<DateTime<Utc>>,
    /// Database to restore into; defaults to the task's database.
    #[serde(default)]
    pub target_database: Option<String>,
}

/// Payload of a point-in-time restore cutover task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitrCutoverPayload {
    /// Database holding the restored data.
    pub restored_database: String,
}

/// Type-specific payload carried by each task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Payload for [`TaskType::DatabaseCreate`].
    DatabaseCreate(DatabaseCreatePayload),
    /// Payload for [`TaskType::SchemaUpdate`].
    SchemaUpdate(MigrationPayload),
    /// Payload for [`TaskType::SchemaUpdateGhostSync`].
    SchemaUpdateGhostSync(GhostSyncPayload),
    /// Payload for [`TaskType::SchemaUpdateGhostCutover`]. The statement
    /// comes from the linked sync task.
    SchemaUpdateGhostCutover,
    /// Payload for [`TaskType::DataUpdate`].
    DataUpdate(MigrationPayload),
    /// Payload for [`TaskType::DatabaseBackup`].
    DatabaseBackup(BackupPayload),
    /// Payload for [`TaskType::PitrRestore`].
    PitrRestore(PitrRestorePayload),
    /// Payload for [`TaskType::PitrCutover`].
    PitrCutover(PitrCutoverPayload),
}

impl TaskPayload {
    /// Returns the task type this payload belongs to.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        match self {
            Self::DatabaseCreate(_) => TaskType::DatabaseCreate,
            Self::SchemaUpdate(_) => TaskType::SchemaUpdate,
            Self::SchemaUpdateGhostSync(_) => TaskType::SchemaUpdateGhostSync,
            Self::SchemaUpdateGhostCutover => TaskType::SchemaUpdateGhostCutover,
            Self::DataUpdate(_) => TaskType::DataUpdate,
            Self::DatabaseBackup(_) => TaskType::DatabaseBackup,
            Self::PitrRestore(_) => TaskType::PitrRestore,
            Self::PitrCutover(_) => TaskType::PitrCutover,
        }
    }

    /// Returns the statement the task executes, if it executes one.
    #[must_use]
    pub fn statement(&self) -> Option<&str> {
        match self {
            Self::DatabaseCreate(payload) => Some(&payload.statement),
            Self::SchemaUpdate(payload) | Self::DataUpdate(payload) => Some(&payload.statement),
            Self::SchemaUpdateGhostSync(payload) => Some(&payload.statement),
            Self::SchemaUpdateGhostCutover
            | Self::DatabaseBackup(_)
            | Self::PitrRestore(_)
            | Self::PitrCutover(_) => None,
        }
    }
}
