//! Executor for database backup tasks.

use super::{open_driver, target_database};
use crate::migration::ports::{BackupStorage, Driver, DriverFactory};
use crate::task::{
    domain::{BackupPayload, Task, TaskPayload, TaskRunResult},
    ports::{ExecutionOutcome, ExecutorError, TaskExecutor},
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Dumps the task's database, schema and data, into backup storage.
pub struct BackupExecutor {
    drivers: Arc<dyn DriverFactory>,
    storage: Arc<dyn BackupStorage>,
}

impl BackupExecutor {
    /// Creates the executor.
    #[must_use]
    pub const fn new(drivers: Arc<dyn DriverFactory>, storage: Arc<dyn BackupStorage>) -> Self {
        Self { drivers, storage }
    }

    async fn back_up(
        &self,
        driver: &dyn Driver,
        database: &str,
        payload: &BackupPayload,
    ) -> Result<TaskRunResult, ExecutorError> {
        let dump = driver.dump(database, false).await?;
        self.storage.put(&payload.backup_name, dump).await?;
        info!(database = %database, backup = %payload.backup_name, "backup stored");
        Ok(TaskRunResult::detail(format!(
            "Backed up database {database:?} as {:?}",
            payload.backup_name
        )))
    }
}

#[async_trait]
impl TaskExecutor for BackupExecutor {
    async fn run_once(&self, _ctx: &CancellationToken, task: &Task) -> ExecutionOutcome {
        let TaskPayload::DatabaseBackup(payload) = task.payload() else {
            return ExecutionOutcome::Failed(ExecutorError::invalid(format!(
                "task {} is not a backup task",
                task.id()
            )));
        };
        let database = match target_database(task) {
            Ok(database) => database,
            Err(err) => return ExecutionOutcome::Failed(err),
        };
        let driver = match open_driver(self.drivers.as_ref(), task, Some(database)).await {
            Ok(driver) => driver,
            Err(outcome) => return outcome,
        };
        let result = self.back_up(driver.as_ref(), database, payload).await;
        driver.close().await;
        result.into()
    }
}
