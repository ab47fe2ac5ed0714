//! gh-ost dry run exposed as a task check.

use crate::osc::{
    domain::{GhostError, GhostResult},
    ports::{GhostMigrator, GhostRequest},
};
use crate::task::{
    domain::{CheckResult, CheckStatus, Task, TaskCheckRun, TaskCheckType},
    ports::{ExecutorError, TaskCheckExecutor},
};
use async_trait::async_trait;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Runs the tool's dry run, converting a panic into
/// [`GhostError::DryRunPanicked`].
///
/// # Errors
///
/// Returns the dry run's error, or the panic message.
pub fn guarded_dry_run(migrator: &dyn GhostMigrator, request: &GhostRequest) -> GhostResult<()> {
    panic::catch_unwind(AssertUnwindSafe(|| migrator.dry_run(request))).unwrap_or_else(
        |payload| Err(GhostError::DryRunPanicked(panic_message(payload.as_ref()))),
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(|text| (*text).to_owned()))
        .unwrap_or_else(|| "unknown panic".to_owned())
}

/// Validates a gh-ost sync task's migration with a dry run.
pub struct GhostSyncCheckExecutor {
    migrator: Arc<dyn GhostMigrator>,
}

impl GhostSyncCheckExecutor {
    /// Creates the executor.
    #[must_use]
    pub const fn new(migrator: Arc<dyn GhostMigrator>) -> Self {
        Self { migrator }
    }
}

#[async_trait]
impl TaskCheckExecutor for GhostSyncCheckExecutor {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        _check_run: &TaskCheckRun,
        task: &Task,
    ) -> Result<Vec<CheckResult>, ExecutorError> {
        let request = GhostRequest::from_task(task)?;
        let title = TaskCheckType::GhostSync.to_string();
        match guarded_dry_run(self.migrator.as_ref(), &request) {
            Ok(()) => Ok(vec![CheckResult::core(
                CheckStatus::Success,
                title,
                "gh-ost dry run succeeded",
            )]),
            Err(err) => {
                warn!(table = %request.table_name, error = %err, "gh-ost dry run failed");
                Ok(vec![CheckResult::core_error(err.code(), title, err.to_string())])
            }
        }
    }
}
