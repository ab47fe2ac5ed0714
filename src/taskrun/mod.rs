//! Executors for statement, backup and restore tasks.
//!
//! Every executor opens one driver per run through a
//! [`crate::migration::ports::DriverFactory`] and closes it before
//! returning. An instance that cannot be reached leaves the task running
//! so a later tick tries again. gh-ost tasks are handled by [`crate::osc`].

mod backup;
mod migrate;
mod pitr;

pub use backup::BackupExecutor;
pub use migrate::MigrateExecutor;
pub use pitr::{PitrCutoverExecutor, PitrRestoreExecutor, pitr_database_name};

use crate::migration::ports::{Driver, DriverError, DriverFactory};
use crate::task::{
    domain::Task,
    ports::{ExecutionOutcome, ExecutorError},
};
use tracing::debug;

fn target_database(task: &Task) -> Result<&str, ExecutorError> {
    task.database()
        .map(|database| database.name.as_str())
        .ok_or_else(|| {
            ExecutorError::invalid(format!("task {} has no target database", task.id()))
        })
}

/// Opens a driver for `task`, treating connection failures as transient.
async fn open_driver(
    drivers: &dyn DriverFactory,
    task: &Task,
    database: Option<&str>,
) -> Result<Box<dyn Driver>, ExecutionOutcome> {
    drivers
        .open(task.instance(), database)
        .await
        .map_err(|err| match err {
            DriverError::Connection { .. } => {
                debug!(task_id = %task.id(), error = %err, "instance unreachable, will retry");
                ExecutionOutcome::Retry(err.into())
            }
            other => ExecutionOutcome::Failed(other.into()),
        })
}

#[cfg(test)]
mod tests;
