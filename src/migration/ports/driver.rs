//! Driver port for target database engines.

use super::{LedgerError, MigrationLedger};
use crate::migration::domain::{MigrationHistory, MigrationHistoryFind};
use crate::task::domain::{Engine, ErrorCode, InstanceRef};
use crate::task::ports::ExecutorError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Connection to one database on one instance.
///
/// A driver is opened per task execution and closed before the executor
/// returns.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Returns the engine behind the connection.
    fn engine(&self) -> Engine;

    /// Checks that the database is reachable.
    async fn ping(&self) -> DriverResult<()>;

    /// Executes `statement` and returns the number of affected rows.
    /// `create_database` skips switching to the target database first.
    async fn execute(&self, statement: &str, create_database: bool) -> DriverResult<u64>;

    /// Dumps `database`, schema only or schema and data.
    async fn dump(&self, database: &str, schema_only: bool) -> DriverResult<String>;

    /// Loads a dump produced by [`Driver::dump`] into `database`.
    async fn restore(&self, database: &str, backup: &str) -> DriverResult<()>;

    /// Rebuilds `target` from the change log of `source` up to and
    /// including `at`.
    ///
    /// Engines without point-in-time recovery return
    /// [`DriverError::NotSupported`].
    async fn replay_to_point_in_time(
        &self,
        _source: &str,
        _target: &str,
        _at: DateTime<Utc>,
    ) -> DriverResult<()> {
        Err(DriverError::NotSupported {
            engine: self.engine(),
            operation: "point-in-time recovery",
        })
    }

    /// Replaces `target` with `restored`, keeping the old data aside.
    async fn swap_database(&self, restored: &str, target: &str) -> DriverResult<()>;

    /// Returns the migration ledger stored on the instance.
    fn ledger(&self) -> Arc<dyn MigrationLedger>;

    /// Returns whether the ledger table still has to be created.
    async fn needs_setup_migration(&self) -> DriverResult<bool> {
        Ok(self.ledger().needs_setup().await?)
    }

    /// Returns ledger rows matching `find`, most recent first.
    async fn find_migration_history_list(
        &self,
        find: &MigrationHistoryFind,
    ) -> DriverResult<Vec<MigrationHistory>> {
        Ok(self.ledger().find_migration_history_list(find).await?)
    }

    /// Releases the connection.
    async fn close(&self);
}

/// Opens drivers for task targets.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Opens a connection to `database` on `instance`, or to the instance
    /// itself when `database` is `None`.
    async fn open(
        &self,
        instance: &InstanceRef,
        database: Option<&str>,
    ) -> DriverResult<Box<dyn Driver>>;
}

/// Errors returned by drivers.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// The instance could not be reached.
    #[error("failed to connect to instance {instance}: {message}")]
    Connection {
        /// Instance name.
        instance: String,
        /// Connection failure detail.
        message: String,
    },

    /// The database rejected a statement.
    #[error("failed to execute {statement:?}: {message}")]
    Execution {
        /// Rejected statement.
        statement: String,
        /// Database error detail.
        message: String,
    },

    /// The addressed database does not exist.
    #[error("database {0:?} not found")]
    DatabaseNotFound(String),

    /// The engine cannot perform the operation.
    #[error("{operation} is not supported for {engine}")]
    NotSupported {
        /// Engine of the instance.
        engine: Engine,
        /// Requested operation.
        operation: &'static str,
    },

    /// The ledger failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Persistence-layer failure.
    #[error("driver error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl DriverError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    /// Returns the error code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Connection { .. } => ErrorCode::DbConnectionFailure,
            Self::Execution { .. } => ErrorCode::DbExecutionError,
            Self::DatabaseNotFound(_) => ErrorCode::NotFound,
            Self::NotSupported { .. } => ErrorCode::NotImplemented,
            Self::Ledger(err) => err.code(),
            Self::Persistence(_) => ErrorCode::Internal,
        }
    }
}

impl From<DriverError> for ExecutorError {
    fn from(err: DriverError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}
