//! Executor for gh-ost cutover tasks.

use crate::config::{GhostSettings, SchedulerConfig};
use crate::migration::{
    domain::{MigrationError, MigrationInfo, MigrationType, MigrationVersion},
    ports::{Driver, DriverFactory},
    services::{MigrationRunError, MigrationService, task_migration_info},
};
use crate::osc::{
    domain::{GhostError, GhostMigrationContext, GhostStateRegistry, SharedGhostState},
    ports::ghost_sync_payload,
};
use crate::task::{
    domain::{Task, TaskRunResult, TaskType},
    ports::{
        CancellationSupport, ExecutionOutcome, ExecutorError, TaskDagFind, TaskExecutor,
        TaskStore,
    },
};
use async_trait::async_trait;
use mockable::Clock;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const CUTOVER_CANCELED: &str = "cutover task canceled";

/// Records the change in the ledger and lets the parked tool swap tables.
pub struct GhostCutoverExecutor<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    registry: Arc<GhostStateRegistry>,
    drivers: Arc<dyn DriverFactory>,
    migrations: MigrationService<C>,
    settings: GhostSettings,
    release_version: String,
}

impl<S, C> GhostCutoverExecutor<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    /// Creates the executor.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        registry: Arc<GhostStateRegistry>,
        drivers: Arc<dyn DriverFactory>,
        clock: Arc<C>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            drivers,
            migrations: MigrationService::new(clock),
            settings: config.ghost,
            release_version: config.release_version.clone(),
        }
    }

    /// Returns the sync task the cutover task depends on.
    async fn sync_task_of(&self, task: &Task) -> Result<Task, ExecutorError> {
        let edges = self
            .store
            .find_task_dag_list(&TaskDagFind {
                to_task_id: Some(task.id()),
                ..TaskDagFind::default()
            })
            .await?;
        for edge in edges {
            if let Some(upstream) = self.store.get_task(edge.from_task_id).await?
                && upstream.task_type() == TaskType::SchemaUpdateGhostSync
            {
                return Ok(upstream);
            }
        }
        Err(GhostError::NoSyncTask(task.id()).into())
    }

    async fn cut_over(
        &self,
        ctx: &CancellationToken,
        task: &Task,
    ) -> Result<TaskRunResult, ExecutorError> {
        let sync_task = self.sync_task_of(task).await?;
        let shared = self.registry.get(sync_task.id())?;

        let result = self.run_parked(ctx, task, &sync_task, &shared).await;
        if let Err(err) = &result {
            shared.context().abort(err.message.clone());
        }
        self.registry.remove(sync_task.id());
        result
    }

    async fn run_parked(
        &self,
        ctx: &CancellationToken,
        task: &Task,
        sync_task: &Task,
        shared: &SharedGhostState,
    ) -> Result<TaskRunResult, ExecutorError> {
        let payload = ghost_sync_payload(sync_task)?;
        let context = shared.context();
        self.wait_for_heartbeat(ctx, context).await?;

        let version = MigrationVersion::plain(&payload.schema_version);
        let info = task_migration_info(
            self.store.as_ref(),
            sync_task,
            context.database(),
            version,
            &self.release_version,
        )
        .await?
        .with_type(MigrationType::Migrate);

        let driver = self
            .drivers
            .open(task.instance(), Some(context.database()))
            .await?;
        let result = self
            .record(ctx, driver.as_ref(), &info, &payload.statement, shared)
            .await;
        driver.close().await;
        result
    }

    async fn wait_for_heartbeat(
        &self,
        ctx: &CancellationToken,
        context: &GhostMigrationContext,
    ) -> Result<(), ExecutorError> {
        let limit = self.settings.cutover_lock_timeout();
        loop {
            let lag = context.heartbeat_lag();
            if lag <= limit {
                return Ok(());
            }
            debug!(lag = ?lag, limit = ?limit, "waiting for replication heartbeat lag");
            tokio::select! {
                biased;
                () = ctx.cancelled() => return Err(ExecutorError::canceled()),
                () = tokio::time::sleep(self.settings.heartbeat_poll_interval()) => {}
            }
        }
    }

    async fn record(
        &self,
        ctx: &CancellationToken,
        driver: &dyn Driver,
        info: &MigrationInfo,
        statement: &str,
        shared: &SharedGhostState,
    ) -> Result<TaskRunResult, ExecutorError> {
        let stored_version = info.version.to_stored().map_err(MigrationRunError::from)?;
        let prev_schema = driver.dump(&info.database, true).await?;
        let ledger = driver.ledger();
        let history_id = match self
            .migrations
            .begin_migration(ledger.as_ref(), info, &prev_schema, statement)
            .await
        {
            Ok(history_id) => history_id,
            Err(MigrationRunError::Migration(MigrationError::AlreadyApplied {
                history_id, ..
            })) => {
                info!(history_id, version = %info.version, "migration already applied");
                shared.context().abort("migration already applied");
                return Ok(TaskRunResult::detail("gh-ost cutover skipped, already applied")
                    .with_migration(history_id, stored_version));
            }
            Err(err) => return Err(err.into()),
        };

        let started = Instant::now();
        shared.context().release_cutover();
        let outcome = tokio::select! {
            biased;
            () = ctx.cancelled() => None,
            swapped = shared.wait_for_outcome() => Some(swapped),
        };
        let applied = match outcome {
            None => Err(ExecutorError::canceled()),
            Some(Err(err)) => Err(ExecutorError::from(err)),
            Some(Ok(())) => driver
                .dump(&info.database, true)
                .await
                .map_err(ExecutorError::from),
        };
        let duration_ns = i64::try_from(started.elapsed().as_nanos()).unwrap_or(i64::MAX);
        if let Err(err) = self
            .migrations
            .end_migration(ledger.as_ref(), history_id, duration_ns, applied.as_deref().ok())
            .await
        {
            error!(history_id, error = %err, "failed to update migration history record");
        }

        applied?;
        info!(history_id, table = %shared.context().table_name(), "gh-ost cutover done");
        Ok(TaskRunResult::detail("gh-ost cutover done").with_migration(history_id, stored_version))
    }
}

#[async_trait]
impl<S, C> TaskExecutor for GhostCutoverExecutor<S, C>
where
    S: TaskStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn cancellation(&self) -> CancellationSupport {
        CancellationSupport::Cooperative
    }

    async fn run_once(&self, ctx: &CancellationToken, task: &Task) -> ExecutionOutcome {
        self.cut_over(ctx, task).await.into()
    }

    /// Aborts the migration parked for the canceled cutover and frees its
    /// slot. Nothing is parked while the sync task is still copying rows.
    async fn release(&self, task: &Task) -> Result<(), ExecutorError> {
        let sync_task = self.sync_task_of(task).await?;
        if let Some(shared) = self.registry.remove(sync_task.id()) {
            shared.context().abort(CUTOVER_CANCELED);
            info!(
                task_id = %task.id(),
                sync_task_id = %sync_task.id(),
                "aborted parked gh-ost migration"
            );
        }
        Ok(())
    }
}
