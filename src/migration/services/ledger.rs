//! Begin/execute/end protocol around every recorded migration.

use crate::migration::{
    domain::{
        MigrationError, MigrationHistory, MigrationHistoryFind, MigrationInfo, MigrationStatus,
        MigrationType, MigrationVersion, PendingMigration,
    },
    ports::{Driver, DriverError, LedgerError, MigrationLedger},
};
use crate::task::{domain::ErrorCode, ports::ExecutorError};
use mockable::Clock;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info};

/// Outcome of [`MigrationService::execute_migration`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationExecution {
    /// Ledger row recording the migration.
    pub history_id: i64,
    /// Schema after the migration. For an already-applied migration this is
    /// the live schema, which nothing changed.
    pub updated_schema: String,
    /// The version was already applied by the same issue and nothing ran.
    pub already_applied: bool,
}

/// Errors returned by the ledger protocol.
#[derive(Debug, Clone, Error)]
pub enum MigrationRunError {
    /// The migration was rejected by a ledger rule.
    #[error(transparent)]
    Migration(#[from] MigrationError),
    /// The target database failed.
    #[error(transparent)]
    Driver(#[from] DriverError),
    /// The ledger failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl MigrationRunError {
    /// Returns the error code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Migration(err) => err.code(),
            Self::Driver(err) => err.code(),
            Self::Ledger(err) => err.code(),
        }
    }
}

impl From<MigrationRunError> for ExecutorError {
    fn from(err: MigrationRunError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

/// Records migrations in the ledger of the database they run against.
pub struct MigrationService<C>
where
    C: Clock + Send + Sync,
{
    clock: Arc<C>,
}

impl<C> Clone for MigrationService<C>
where
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C> MigrationService<C>
where
    C: Clock + Send + Sync,
{
    /// Creates the service.
    #[must_use]
    pub const fn new(clock: Arc<C>) -> Self {
        Self { clock }
    }

    /// Runs `statement` through the ledger protocol.
    ///
    /// The pre-image is dumped unless the statement creates the database,
    /// then a `Pending` row is recorded. The statement runs unless it is
    /// empty or the row is a baseline, the post-image is dumped, and the
    /// row is finalized as `Done` or `Failed`. A failure to finalize is
    /// logged and does not change the outcome.
    ///
    /// A version already applied by the same issue returns the existing row
    /// and the live schema without executing anything.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationRunError`] when a ledger rule rejects the
    /// migration, the statement fails, or a dump fails.
    pub async fn execute_migration(
        &self,
        driver: &dyn Driver,
        info: &MigrationInfo,
        statement: &str,
    ) -> Result<MigrationExecution, MigrationRunError> {
        let prev_schema = if info.create_database {
            String::new()
        } else {
            driver.dump(&info.database, true).await?
        };

        let ledger = driver.ledger();
        let history_id = match self
            .begin_migration(ledger.as_ref(), info, &prev_schema, statement)
            .await
        {
            Ok(history_id) => history_id,
            Err(MigrationRunError::Migration(MigrationError::AlreadyApplied {
                history_id, ..
            })) => {
                info!(
                    history_id,
                    namespace = %info.namespace,
                    version = %info.version,
                    "migration already applied"
                );
                return Ok(MigrationExecution {
                    history_id,
                    updated_schema: prev_schema,
                    already_applied: true,
                });
            }
            Err(err) => return Err(err),
        };

        let started = Instant::now();
        let outcome = apply(driver, info, statement).await;
        let duration_ns = i64::try_from(started.elapsed().as_nanos()).unwrap_or(i64::MAX);
        let updated_schema = outcome.as_deref().ok();
        if let Err(err) = self
            .end_migration(ledger.as_ref(), history_id, duration_ns, updated_schema)
            .await
        {
            error!(history_id, error = %err, "failed to update migration history record");
        }

        Ok(MigrationExecution {
            history_id,
            updated_schema: outcome?,
            already_applied: false,
        })
    }

    /// Validates `info` against the ledger and records a `Pending` row.
    ///
    /// Returns the id of the recorded row, or of the reused row when
    /// `force` is set and an earlier attempt is pending or failed.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::AlreadyApplied`] when the same issue
    /// already applied the version, another [`MigrationError`] when a
    /// ledger rule rejects it, and [`MigrationRunError::Ledger`] when the
    /// ledger fails.
    pub async fn begin_migration(
        &self,
        ledger: &dyn MigrationLedger,
        info: &MigrationInfo,
        prev_schema: &str,
        statement: &str,
    ) -> Result<i64, MigrationRunError> {
        let stored_version = info.version.to_stored()?;
        let existing = ledger
            .find_migration_history_list(
                &MigrationHistoryFind::namespace(&info.namespace)
                    .with_version(&stored_version)
                    .with_limit(1),
            )
            .await?;
        if let Some(row) = existing.into_iter().next() {
            return reuse_or_reject(&row, info).map_err(MigrationRunError::from);
        }

        let largest_sequence = ledger.find_largest_sequence(&info.namespace, false).await?;
        if let Some(applied) = ledger
            .find_largest_version_since_baseline(&info.namespace)
            .await?
            && !applied.is_empty()
            && applied >= stored_version
        {
            return Err(MigrationError::OutOfOrder {
                database: info.database.clone(),
                applied,
                version: stored_version,
            }
            .into());
        }

        let pending = PendingMigration {
            creator: info.creator.clone(),
            created_at: self.clock.utc(),
            release_version: info.release_version.clone(),
            namespace: info.namespace.clone(),
            sequence: largest_sequence + 1,
            source: info.source,
            migration_type: info.migration_type,
            version: stored_version,
            description: info.description.clone(),
            statement: statement.to_owned(),
            schema_prev: prev_schema.to_owned(),
            issue_id: info.issue_id,
            payload: info.payload.clone(),
        };
        let history_id = ledger.insert_pending_history(&pending).await?;
        debug!(
            history_id,
            namespace = %info.namespace,
            sequence = pending.sequence,
            "recorded pending migration"
        );
        Ok(history_id)
    }

    /// Finalizes a row as `Done` with `updated_schema`, or as `Failed` when
    /// there is none.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the row cannot be updated.
    pub async fn end_migration(
        &self,
        ledger: &dyn MigrationLedger,
        history_id: i64,
        duration_ns: i64,
        updated_schema: Option<&str>,
    ) -> Result<(), LedgerError> {
        let now = self.clock.utc();
        match updated_schema {
            Some(schema) => {
                ledger
                    .update_history_as_done(history_id, duration_ns, schema, now)
                    .await
            }
            None => {
                ledger
                    .update_history_as_failed(history_id, duration_ns, now)
                    .await
            }
        }
    }

    /// Returns the version of the most recent row of `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationRunError`] when the ledger cannot be read or the
    /// stored version is malformed.
    pub async fn latest_schema_version(
        &self,
        driver: &dyn Driver,
        namespace: &str,
    ) -> Result<Option<MigrationVersion>, MigrationRunError> {
        let latest = driver
            .find_migration_history_list(&MigrationHistoryFind::namespace(namespace).with_limit(1))
            .await?;
        Ok(latest
            .first()
            .map(|row| MigrationVersion::from_stored(&row.version))
            .transpose()?)
    }
}

fn reuse_or_reject(row: &MigrationHistory, info: &MigrationInfo) -> Result<i64, MigrationError> {
    let database = info.database.clone();
    let version = info.version.version.clone();
    match row.status {
        MigrationStatus::Done if row.issue_id == info.issue_id => {
            Err(MigrationError::AlreadyApplied {
                history_id: row.id,
                database,
                version,
            })
        }
        MigrationStatus::Done => Err(MigrationError::AppliedByOtherIssue {
            database,
            version,
            issue: MigrationError::describe_issue(row.issue_id),
        }),
        MigrationStatus::Pending if info.force => {
            debug!(history_id = row.id, "reusing pending migration row");
            Ok(row.id)
        }
        MigrationStatus::Pending => Err(MigrationError::InProgress { database, version }),
        MigrationStatus::Failed if info.force => {
            debug!(history_id = row.id, "reusing failed migration row");
            Ok(row.id)
        }
        MigrationStatus::Failed => Err(MigrationError::PreviouslyFailed { database, version }),
    }
}

async fn apply(
    driver: &dyn Driver,
    info: &MigrationInfo,
    statement: &str,
) -> Result<String, DriverError> {
    if !statement.trim().is_empty() && info.migration_type != MigrationType::Baseline {
        driver.execute(statement, info.create_database).await?;
    }
    match driver.dump(&info.database, true).await {
        Err(DriverError::DatabaseNotFound(database)) => {
            debug!(
                database = %database,
                "migration dropped its database; recording an empty schema"
            );
            Ok(String::new())
        }
        dumped => dumped,
    }
}
