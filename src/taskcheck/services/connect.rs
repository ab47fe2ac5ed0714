//! Connectivity and ledger checks against the target instance.

use crate::migration::ports::{DriverFactory, DriverResult};
use crate::task::{
    domain::{CheckResult, CheckStatus, ErrorCode, Task, TaskCheckRun},
    ports::{ExecutorError, TaskCheckExecutor},
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Checks that the task's database accepts connections.
pub struct DatabaseConnectCheckExecutor {
    drivers: Arc<dyn DriverFactory>,
}

impl DatabaseConnectCheckExecutor {
    /// Creates the executor.
    #[must_use]
    pub const fn new(drivers: Arc<dyn DriverFactory>) -> Self {
        Self { drivers }
    }

    async fn ping(&self, task: &Task, database: Option<&str>) -> DriverResult<()> {
        let driver = self.drivers.open(task.instance(), database).await?;
        let pinged = driver.ping().await;
        driver.close().await;
        pinged
    }
}

#[async_trait]
impl TaskCheckExecutor for DatabaseConnectCheckExecutor {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        _check_run: &TaskCheckRun,
        task: &Task,
    ) -> Result<Vec<CheckResult>, ExecutorError> {
        let database = task.database().map(|found| found.name.as_str());
        let target = database.unwrap_or(&task.instance().name);
        let result = match self.ping(task, database).await {
            Ok(()) => CheckResult::core(
                CheckStatus::Success,
                "OK",
                format!("Successfully connected to {target:?}"),
            ),
            Err(err) => {
                debug!(task_id = %task.id(), error = %err, "database connect check failed");
                CheckResult::core_error(err.code(), "Failed to connect", err.to_string())
            }
        };
        Ok(vec![result])
    }
}

/// Checks that the instance has the migration ledger set up.
pub struct MigrationSchemaCheckExecutor {
    drivers: Arc<dyn DriverFactory>,
}

impl MigrationSchemaCheckExecutor {
    /// Creates the executor.
    #[must_use]
    pub const fn new(drivers: Arc<dyn DriverFactory>) -> Self {
        Self { drivers }
    }

    async fn needs_setup(&self, task: &Task) -> DriverResult<bool> {
        let driver = self.drivers.open(task.instance(), None).await?;
        let needed = driver.needs_setup_migration().await;
        driver.close().await;
        needed
    }
}

#[async_trait]
impl TaskCheckExecutor for MigrationSchemaCheckExecutor {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        _check_run: &TaskCheckRun,
        task: &Task,
    ) -> Result<Vec<CheckResult>, ExecutorError> {
        let instance = &task.instance().name;
        let result = match self.needs_setup(task).await {
            Ok(false) => CheckResult::core(
                CheckStatus::Success,
                "OK",
                format!("Migration schema found on instance {instance:?}"),
            ),
            Ok(true) => CheckResult::core_error(
                ErrorCode::MigrationSchemaMissing,
                "Missing migration schema",
                format!("Please create migration schema on instance {instance:?} first."),
            ),
            Err(err) => CheckResult::core_error(
                err.code(),
                "Failed to check migration schema",
                err.to_string(),
            ),
        };
        Ok(vec![result])
    }
}
