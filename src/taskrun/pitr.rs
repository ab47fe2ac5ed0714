//! Executors for point-in-time restore tasks and their cutover.
//!
//! A restore either loads a named backup or replays the source database's
//! change log up to a point in time. Without an explicit target database
//! the data lands in a staging database named by [`pitr_database_name`],
//! which the cutover task later swaps into place.

use super::{open_driver, target_database};
use crate::config::{CutoverPolicies, SchedulerConfig};
use crate::migration::{
    domain::{MigrationType, MigrationVersion},
    ports::{BackupStorage, Driver, DriverFactory},
    services::{MigrationRunError, MigrationService, task_migration_info},
};
use crate::task::{
    domain::{PitrCutoverPayload, PitrRestorePayload, Task, TaskPayload, TaskRunResult},
    ports::{CancellationSupport, ExecutionOutcome, ExecutorError, TaskExecutor, TaskStore},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Returns the staging database an in-place restore of `database` writes
/// to, suffixed with the Unix timestamp of the requesting issue.
#[must_use]
pub fn pitr_database_name(database: &str, suffix_ts: i64) -> String {
    format!("{database}_pitr_{suffix_ts}")
}

enum RestoreFrom<'a> {
    Backup(&'a str),
    PointInTime(DateTime<Utc>),
}

struct RestorePlan<'a> {
    source: &'a str,
    target: String,
    in_place: bool,
    from: RestoreFrom<'a>,
}

fn restore_payload(task: &Task) -> Result<&PitrRestorePayload, ExecutorError> {
    match task.payload() {
        TaskPayload::PitrRestore(payload) => Ok(payload),
        _ => Err(ExecutorError::invalid(format!(
            "task {} is not a PITR restore task",
            task.id()
        ))),
    }
}

fn cutover_payload(task: &Task) -> Result<&PitrCutoverPayload, ExecutorError> {
    match task.payload() {
        TaskPayload::PitrCutover(payload) => Ok(payload),
        _ => Err(ExecutorError::invalid(format!(
            "task {} is not a PITR cutover task",
            task.id()
        ))),
    }
}

/// Restores a database from a backup or to a point in time.
pub struct PitrRestoreExecutor<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    drivers: Arc<dyn DriverFactory>,
    storage: Arc<dyn BackupStorage>,
    migrations: MigrationService<C>,
    clock: Arc<C>,
    release_version: String,
}

impl<S, C> PitrRestoreExecutor<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    /// Creates the executor.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        drivers: Arc<dyn DriverFactory>,
        storage: Arc<dyn BackupStorage>,
        clock: Arc<C>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            store,
            drivers,
            storage,
            migrations: MigrationService::new(Arc::clone(&clock)),
            clock,
            release_version: config.release_version.clone(),
        }
    }

    async fn plan<'a>(&self, task: &'a Task) -> Result<RestorePlan<'a>, ExecutorError> {
        let payload = restore_payload(task)?;
        let from = match (&payload.backup_name, payload.point_in_time) {
            (Some(backup_name), None) => RestoreFrom::Backup(backup_name),
            (None, Some(at)) => RestoreFrom::PointInTime(at),
            _ => {
                return Err(ExecutorError::invalid(
                    "only one of backup name and point in time can be set",
                ));
            }
        };
        let source = target_database(task)?;
        let issue_created_at = self
            .store
            .get_issue_by_pipeline_id(task.pipeline_id())
            .await?
            .map_or_else(|| task.created_at(), |issue| issue.created_at);
        let target = payload.target_database.clone().unwrap_or_else(|| {
            pitr_database_name(source, issue_created_at.timestamp())
        });
        Ok(RestorePlan {
            source,
            target,
            in_place: payload.target_database.is_none(),
            from,
        })
    }

    async fn restore(
        &self,
        driver: &dyn Driver,
        task: &Task,
        plan: &RestorePlan<'_>,
    ) -> Result<TaskRunResult, ExecutorError> {
        match plan.from {
            RestoreFrom::Backup(backup_name) => {
                self.restore_backup(driver, task, plan, backup_name).await
            }
            RestoreFrom::PointInTime(at) => {
                debug!(
                    source = %plan.source,
                    target = %plan.target,
                    at = %at,
                    "replaying change log"
                );
                driver
                    .replay_to_point_in_time(plan.source, &plan.target, at)
                    .await?;
                info!(target = %plan.target, "PITR restore success");
                Ok(TaskRunResult::detail(format!(
                    "PITR restore success for target database {:?}",
                    plan.target
                )))
            }
        }
    }

    async fn restore_backup(
        &self,
        driver: &dyn Driver,
        task: &Task,
        plan: &RestorePlan<'_>,
        backup_name: &str,
    ) -> Result<TaskRunResult, ExecutorError> {
        let backup = self.storage.get(backup_name).await?;
        driver.restore(&plan.target, &backup).await?;
        info!(backup = %backup_name, target = %plan.target, "backup restored");
        if plan.in_place {
            return Ok(TaskRunResult::detail(format!(
                "Restored backup {backup_name:?} to the temporary PITR database {:?}",
                plan.target
            )));
        }

        let version = MigrationVersion::timestamp(self.clock.utc());
        let stored_version = version.to_stored().map_err(MigrationRunError::from)?;
        let info = task_migration_info(
            self.store.as_ref(),
            task,
            &plan.target,
            version,
            &self.release_version,
        )
        .await?
        .with_type(MigrationType::Branch)
        .with_description(format!(
            "Restored from backup {backup_name:?} of database {:?}.",
            plan.source
        ));
        let execution = self.migrations.execute_migration(driver, &info, "").await?;
        Ok(TaskRunResult::detail(format!(
            "Restored database {:?} from backup {backup_name:?}",
            plan.target
        ))
        .with_migration(execution.history_id, stored_version))
    }
}

#[async_trait]
impl<S, C> TaskExecutor for PitrRestoreExecutor<S, C>
where
    S: TaskStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    async fn run_once(&self, _ctx: &CancellationToken, task: &Task) -> ExecutionOutcome {
        let plan = match self.plan(task).await {
            Ok(plan) => plan,
            Err(err) => return ExecutionOutcome::Failed(err),
        };
        let driver = match open_driver(self.drivers.as_ref(), task, None).await {
            Ok(driver) => driver,
            Err(outcome) => return outcome,
        };
        let result = self.restore(driver.as_ref(), task, &plan).await;
        driver.close().await;
        result.into()
    }
}

/// Swaps a restored database into place under the engine's cutover policy.
pub struct PitrCutoverExecutor {
    drivers: Arc<dyn DriverFactory>,
    policies: CutoverPolicies,
}

impl PitrCutoverExecutor {
    /// Creates the executor.
    #[must_use]
    pub const fn new(drivers: Arc<dyn DriverFactory>, config: &SchedulerConfig) -> Self {
        Self {
            drivers,
            policies: config.cutover_policies,
        }
    }

    async fn swap(
        &self,
        ctx: &CancellationToken,
        driver: &dyn Driver,
        restored: &str,
        target: &str,
    ) -> Result<TaskRunResult, ExecutorError> {
        let policy = self.policies.for_engine(driver.engine());
        let attempts = policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            match driver.swap_database(restored, target).await {
                Ok(()) => {
                    info!(restored = %restored, target = %target, attempt, "database swapped");
                    return Ok(TaskRunResult::detail(format!(
                        "Swapped database {restored:?} into {target:?}"
                    )));
                }
                Err(err) if attempt < attempts => {
                    warn!(attempt, error = %err, "database swap failed, retrying");
                    tokio::select! {
                        biased;
                        () = ctx.cancelled() => return Err(ExecutorError::canceled()),
                        () = tokio::time::sleep(policy.backoff()) => {}
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(ExecutorError::internal("database swap was never attempted"))
    }
}

#[async_trait]
impl TaskExecutor for PitrCutoverExecutor {
    fn cancellation(&self) -> CancellationSupport {
        CancellationSupport::Cooperative
    }

    async fn run_once(&self, ctx: &CancellationToken, task: &Task) -> ExecutionOutcome {
        let (payload, target) = match cutover_payload(task)
            .and_then(|payload| target_database(task).map(|target| (payload, target)))
        {
            Ok(found) => found,
            Err(err) => return ExecutionOutcome::Failed(err),
        };
        let driver = match open_driver(self.drivers.as_ref(), task, None).await {
            Ok(driver) => driver,
            Err(outcome) => return outcome,
        };
        let result = self
            .swap(ctx, driver.as_ref(), &payload.restored_database, target)
            .await;
        driver.close().await;
        result.into()
    }
}
