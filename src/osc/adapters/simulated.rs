//! Simulated gh-ost tool for development and tests.
//!
//! The simulation copies rows in timed steps, parks on the postpone flag and
//! applies the `ALTER TABLE` through a driver when released, so the ledger's
//! post-image reflects the change.

use crate::migration::ports::DriverFactory;
use crate::osc::{
    domain::{GhostError, GhostMigrationContext, GhostResult},
    ports::{GhostMigrator, GhostRequest, GhostRun},
};
use crate::task::domain::TaskId;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
enum DryRunBehaviour {
    Accept,
    Reject(String),
    Panic(String),
}

#[derive(Debug, Default)]
struct SimulationLog {
    started: Vec<TaskId>,
    cut_over: Vec<String>,
    aborted: Vec<String>,
}

/// gh-ost stand-in that runs against the instances of a [`DriverFactory`].
#[derive(Clone)]
pub struct SimulatedGhostMigrator {
    drivers: Arc<dyn DriverFactory>,
    total_rows: u64,
    rows_per_step: u64,
    step_interval: Duration,
    heartbeat_lag: Duration,
    cutover_failure: Option<String>,
    dry_run: DryRunBehaviour,
    log: Arc<Mutex<SimulationLog>>,
}

impl std::fmt::Debug for SimulatedGhostMigrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedGhostMigrator")
            .field("total_rows", &self.total_rows)
            .field("rows_per_step", &self.rows_per_step)
            .field("step_interval", &self.step_interval)
            .finish_non_exhaustive()
    }
}

impl SimulatedGhostMigrator {
    /// Creates a migrator copying 1000 rows in steps of 250 every 5ms.
    #[must_use]
    pub fn new(drivers: Arc<dyn DriverFactory>) -> Self {
        Self {
            drivers,
            total_rows: 1_000,
            rows_per_step: 250,
            step_interval: Duration::from_millis(5),
            heartbeat_lag: Duration::ZERO,
            cutover_failure: None,
            dry_run: DryRunBehaviour::Accept,
            log: Arc::new(Mutex::new(SimulationLog::default())),
        }
    }

    /// Sets the table size and the rows copied per step.
    #[must_use]
    pub fn with_rows(mut self, total_rows: u64, rows_per_step: u64) -> Self {
        self.total_rows = total_rows;
        self.rows_per_step = rows_per_step.max(1);
        self
    }

    /// Sets the delay between copy steps.
    #[must_use]
    pub const fn with_step_interval(mut self, step_interval: Duration) -> Self {
        self.step_interval = step_interval;
        self
    }

    /// Sets the heartbeat lag reported when the migration starts.
    #[must_use]
    pub const fn with_heartbeat_lag(mut self, lag: Duration) -> Self {
        self.heartbeat_lag = lag;
        self
    }

    /// Makes the table swap fail with `message`.
    #[must_use]
    pub fn failing_cutover(mut self, message: impl Into<String>) -> Self {
        self.cutover_failure = Some(message.into());
        self
    }

    /// Makes the dry run reject every migration with `message`.
    #[must_use]
    pub fn rejecting_dry_run(mut self, message: impl Into<String>) -> Self {
        self.dry_run = DryRunBehaviour::Reject(message.into());
        self
    }

    /// Makes the dry run panic with `message`.
    #[must_use]
    pub fn panicking_dry_run(mut self, message: impl Into<String>) -> Self {
        self.dry_run = DryRunBehaviour::Panic(message.into());
        self
    }

    fn log(&self) -> MutexGuard<'_, SimulationLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the sync tasks that started a migration.
    #[must_use]
    pub fn started(&self) -> Vec<TaskId> {
        self.log().started.clone()
    }

    /// Returns the tables swapped so far.
    #[must_use]
    pub fn cut_over_tables(&self) -> Vec<String> {
        self.log().cut_over.clone()
    }

    /// Returns the abort reasons received so far.
    #[must_use]
    pub fn aborted(&self) -> Vec<String> {
        self.log().aborted.clone()
    }

    async fn copy_and_cut_over(
        &self,
        request: &GhostRequest,
        context: &GhostMigrationContext,
    ) -> GhostResult<()> {
        let mut remaining = self.total_rows;
        while remaining > 0 {
            tokio::time::sleep(self.step_interval).await;
            let step = remaining.min(self.rows_per_step);
            context.add_copied_rows(step);
            remaining -= step;
        }
        context.mark_ready_to_cut_over();
        debug!(table = %request.table_name, "row copy complete, postponing cut-over");

        context.wait_for_cutover_release().await?;
        if let Some(message) = &self.cutover_failure {
            return Err(GhostError::Tool(message.clone()));
        }
        self.swap_tables(request).await?;
        self.log().cut_over.push(request.table_name.clone());
        Ok(())
    }

    async fn swap_tables(&self, request: &GhostRequest) -> GhostResult<()> {
        let driver = self
            .drivers
            .open(&request.instance, Some(&request.database))
            .await
            .map_err(|err| GhostError::Tool(err.to_string()))?;
        let statement = format!(
            "ALTER TABLE `{}` {}",
            request.table_name, request.alter_statement
        );
        let result = driver.execute(&statement, false).await;
        driver.close().await;
        result
            .map(|_| ())
            .map_err(|err| GhostError::Tool(err.to_string()))
    }

    async fn drive(
        &self,
        request: &GhostRequest,
        context: &GhostMigrationContext,
        outcome: oneshot::Sender<GhostResult<()>>,
    ) {
        let result = tokio::select! {
            reason = context.aborted() => Err(GhostError::Aborted(reason)),
            copied = self.copy_and_cut_over(request, context) => copied,
        };
        match &result {
            Ok(()) => info!(table = %request.table_name, "gh-ost cut-over complete"),
            Err(GhostError::Aborted(reason)) => {
                warn!(table = %request.table_name, reason = %reason, "gh-ost aborted");
                self.log().aborted.push(reason.clone());
            }
            Err(err) => warn!(table = %request.table_name, error = %err, "gh-ost failed"),
        }
        if outcome.send(result).is_err() {
            debug!(table = %request.table_name, "gh-ost outcome has no listener");
        }
    }
}

#[async_trait]
impl GhostMigrator for SimulatedGhostMigrator {
    fn dry_run(&self, request: &GhostRequest) -> GhostResult<()> {
        match &self.dry_run {
            DryRunBehaviour::Accept => Ok(()),
            DryRunBehaviour::Reject(message) => Err(GhostError::DryRun(format!(
                "{}: {message}",
                request.table_name
            ))),
            DryRunBehaviour::Panic(message) => std::panic::panic_any(message.clone()),
        }
    }

    async fn start(&self, request: &GhostRequest) -> GhostResult<GhostRun> {
        let context = Arc::new(GhostMigrationContext::new(
            request.database.clone(),
            request.table_name.clone(),
        ));
        context.set_total_rows(self.total_rows);
        context.set_heartbeat_lag(self.heartbeat_lag);
        let (sender, receiver) = oneshot::channel();
        self.log().started.push(request.sync_task_id);

        let migrator = self.clone();
        let owned_request = request.clone();
        let shared_context = Arc::clone(&context);
        tokio::spawn(async move {
            migrator
                .drive(&owned_request, &shared_context, sender)
                .await;
        });
        Ok(GhostRun {
            context,
            outcome: receiver,
        })
    }
}
