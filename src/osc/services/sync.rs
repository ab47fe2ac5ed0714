//! Executor for gh-ost sync tasks.

use crate::config::GhostSettings;
use crate::osc::{
    domain::{GhostError, GhostMigrationContext, GhostStateRegistry, SharedGhostState},
    ports::{GhostMigrator, GhostRequest, GhostRun},
};
use crate::task::{
    domain::{Task, TaskId, TaskProgress, TaskRunResult},
    ports::{CancellationSupport, ExecutionOutcome, ExecutorError, TaskExecutor},
    services::TaskProgressBoard,
};
use async_trait::async_trait;
use mockable::Clock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Starts the row copy and parks the migration for the cutover task.
///
/// The task finishes as soon as the tool is ready to cut over; the tool
/// keeps running in the background with its swap postponed.
pub struct GhostSyncExecutor<C>
where
    C: Clock + Send + Sync,
{
    migrator: Arc<dyn GhostMigrator>,
    registry: Arc<GhostStateRegistry>,
    progress: Arc<TaskProgressBoard>,
    settings: GhostSettings,
    clock: Arc<C>,
}

impl<C> GhostSyncExecutor<C>
where
    C: Clock + Send + Sync,
{
    /// Creates the executor.
    #[must_use]
    pub const fn new(
        migrator: Arc<dyn GhostMigrator>,
        registry: Arc<GhostStateRegistry>,
        progress: Arc<TaskProgressBoard>,
        settings: GhostSettings,
        clock: Arc<C>,
    ) -> Self {
        Self {
            migrator,
            registry,
            progress,
            settings,
            clock,
        }
    }

    fn publish(&self, task_id: TaskId, context: &GhostMigrationContext) {
        let (copied, total) = context.row_copy_progress();
        self.progress.publish(
            task_id,
            TaskProgress {
                total_unit: total,
                completed_unit: copied,
                updated_at: self.clock.utc(),
            },
        );
    }

    async fn sync(
        &self,
        ctx: &CancellationToken,
        task: &Task,
    ) -> Result<TaskRunResult, ExecutorError> {
        let request = GhostRequest::from_task(task)?;
        let GhostRun {
            context,
            mut outcome,
        } = self.migrator.start(&request).await?;
        info!(
            database = %request.database,
            table = %request.table_name,
            "gh-ost sync started"
        );

        let mut ticker = tokio::time::interval(self.settings.progress_poll_interval());
        loop {
            tokio::select! {
                biased;
                () = ctx.cancelled() => {
                    context.abort("sync task canceled");
                    return Err(ExecutorError::canceled());
                }
                ready = context.wait_until_ready_to_cut_over() => {
                    ready?;
                    break;
                }
                exited = &mut outcome => {
                    let err = match exited {
                        Ok(Err(err)) => err,
                        Ok(Ok(())) | Err(_) => GhostError::ToolExited,
                    };
                    warn!(
                        table = %request.table_name,
                        error = %err,
                        "gh-ost stopped during sync"
                    );
                    return Err(err.into());
                }
                _ = ticker.tick() => self.publish(task.id(), &context),
            }
        }
        self.publish(task.id(), &context);

        let shared = SharedGhostState::new(Arc::clone(&context), outcome);
        if let Err(err) = self.registry.insert(task.id(), shared) {
            context.abort(err.to_string());
            return Err(err.into());
        }
        info!(table = %request.table_name, "gh-ost sync done, cut-over postponed");
        Ok(TaskRunResult::detail("sync done"))
    }
}

#[async_trait]
impl<C> TaskExecutor for GhostSyncExecutor<C>
where
    C: Clock + Send + Sync,
{
    fn cancellation(&self) -> CancellationSupport {
        CancellationSupport::Cooperative
    }

    async fn run_once(&self, ctx: &CancellationToken, task: &Task) -> ExecutionOutcome {
        self.sync(ctx, task).await.into()
    }
}
