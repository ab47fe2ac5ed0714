//! Executor for database-create, schema-update and data-update tasks.

use super::{open_driver, target_database};
use crate::config::SchedulerConfig;
use crate::migration::{
    domain::{MigrationInfo, MigrationType, MigrationVersion},
    ports::{Driver, DriverFactory},
    services::{MigrationRunError, MigrationService, task_migration_info},
};
use crate::task::{
    domain::{MigrationPayload, Task, TaskPayload, TaskRunResult},
    ports::{ExecutionOutcome, ExecutorError, TaskExecutor, TaskStore},
};
use async_trait::async_trait;
use mockable::Clock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A statement bound to the ledger row describing it.
struct PlannedMigration<'a> {
    database: &'a str,
    connect_to: Option<&'a str>,
    statement: &'a str,
    info: MigrationInfo,
}

/// Runs a task's statement through the migration ledger protocol.
pub struct MigrateExecutor<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    drivers: Arc<dyn DriverFactory>,
    migrations: MigrationService<C>,
    clock: Arc<C>,
    release_version: String,
}

impl<S, C> MigrateExecutor<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    /// Creates the executor.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        drivers: Arc<dyn DriverFactory>,
        clock: Arc<C>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            store,
            drivers,
            migrations: MigrationService::new(Arc::clone(&clock)),
            clock,
            release_version: config.release_version.clone(),
        }
    }

    fn version_or_now(&self, schema_version: &str) -> MigrationVersion {
        if schema_version.is_empty() {
            MigrationVersion::timestamp(self.clock.utc())
        } else {
            MigrationVersion::plain(schema_version)
        }
    }

    fn payload_version(&self, payload: &MigrationPayload) -> MigrationVersion {
        if payload.use_semantic_version {
            MigrationVersion::semantic(&payload.schema_version, &payload.semantic_version_suffix)
        } else {
            self.version_or_now(&payload.schema_version)
        }
    }

    async fn plan<'a>(&self, task: &'a Task) -> Result<PlannedMigration<'a>, ExecutorError> {
        let (database, connect_to, statement, version, migration_type, force) =
            match task.payload() {
                TaskPayload::DatabaseCreate(payload) => (
                    payload.database_name.as_str(),
                    None,
                    payload.statement.as_str(),
                    self.version_or_now(&payload.schema_version),
                    MigrationType::Migrate,
                    false,
                ),
                TaskPayload::SchemaUpdate(payload) | TaskPayload::DataUpdate(payload) => {
                    let database = target_database(task)?;
                    let migration_type = if matches!(task.payload(), TaskPayload::DataUpdate(_)) {
                        MigrationType::Data
                    } else {
                        MigrationType::Migrate
                    };
                    (
                        database,
                        Some(database),
                        payload.statement.as_str(),
                        self.payload_version(payload),
                        migration_type,
                        payload.force,
                    )
                }
                other => {
                    return Err(ExecutorError::invalid(format!(
                        "{} tasks do not run a migration statement",
                        other.task_type()
                    )));
                }
            };

        let mut info = task_migration_info(
            self.store.as_ref(),
            task,
            database,
            version,
            &self.release_version,
        )
        .await?
        .with_type(migration_type)
        .with_force(force);
        if connect_to.is_none() {
            info = info.creating_database();
        }
        Ok(PlannedMigration {
            database,
            connect_to,
            statement,
            info,
        })
    }

    async fn migrate(
        &self,
        driver: &dyn Driver,
        planned: &PlannedMigration<'_>,
    ) -> Result<TaskRunResult, ExecutorError> {
        let stored_version = planned
            .info
            .version
            .to_stored()
            .map_err(MigrationRunError::from)?;
        let execution = self
            .migrations
            .execute_migration(driver, &planned.info, planned.statement)
            .await?;
        let detail = if execution.already_applied {
            format!(
                "Skipped already applied migration version {} on database {:?}",
                planned.info.version, planned.database
            )
        } else {
            format!(
                "Applied migration version {} to database {:?}",
                planned.info.version, planned.database
            )
        };
        info!(
            history_id = execution.history_id,
            database = %planned.database,
            version = %planned.info.version,
            already_applied = execution.already_applied,
            "migration executed"
        );
        Ok(TaskRunResult::detail(detail).with_migration(execution.history_id, stored_version))
    }
}

#[async_trait]
impl<S, C> TaskExecutor for MigrateExecutor<S, C>
where
    S: TaskStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    async fn run_once(&self, _ctx: &CancellationToken, task: &Task) -> ExecutionOutcome {
        let planned = match self.plan(task).await {
            Ok(planned) => planned,
            Err(err) => return ExecutionOutcome::Failed(err),
        };
        let driver =
            match open_driver(self.drivers.as_ref(), task, planned.connect_to).await {
                Ok(driver) => driver,
                Err(outcome) => return outcome,
            };
        let result = self.migrate(driver.as_ref(), &planned).await;
        driver.close().await;
        result.into()
    }
}
