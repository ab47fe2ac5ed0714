//! Port through which executors start and validate gh-ost migrations.

use crate::osc::domain::{GhostError, GhostMigrationContext, GhostResult};
use crate::task::domain::{GhostSyncPayload, InstanceRef, Task, TaskId, TaskPayload};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Returns the gh-ost payload of a sync task.
///
/// # Errors
///
/// Returns [`GhostError::NotGhostSync`] for any other payload.
pub fn ghost_sync_payload(task: &Task) -> GhostResult<&GhostSyncPayload> {
    match task.payload() {
        TaskPayload::SchemaUpdateGhostSync(payload) => Ok(payload),
        _ => Err(GhostError::NotGhostSync(task.id())),
    }
}

/// Table migration requested from the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostRequest {
    /// Sync task driving the migration.
    pub sync_task_id: TaskId,
    /// Instance holding the table.
    pub instance: InstanceRef,
    /// Database holding the table.
    pub database: String,
    /// Table to migrate.
    pub table_name: String,
    /// `ALTER TABLE` clause applied to the ghost table.
    pub alter_statement: String,
}

impl GhostRequest {
    /// Builds the request of a gh-ost sync task.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::NotGhostSync`] when the task is not a sync task
    /// and [`GhostError::MissingDatabase`] when it has no database.
    pub fn from_task(task: &Task) -> GhostResult<Self> {
        let payload = ghost_sync_payload(task)?;
        let database = task
            .database()
            .ok_or(GhostError::MissingDatabase(task.id()))?;
        Ok(Self {
            sync_task_id: task.id(),
            instance: task.instance().clone(),
            database: database.name.clone(),
            table_name: payload.table_name.clone(),
            alter_statement: payload.alter_statement.clone(),
        })
    }
}

/// A migration started by [`GhostMigrator::start`].
#[derive(Debug)]
pub struct GhostRun {
    /// Live migration state.
    pub context: Arc<GhostMigrationContext>,
    /// Receives the tool's final outcome after the table swap or abort.
    pub outcome: oneshot::Receiver<GhostResult<()>>,
}

/// Runs gh-ost migrations.
#[async_trait]
pub trait GhostMigrator: Send + Sync {
    /// Validates the migration without copying any rows.
    ///
    /// Implementations wrap a third-party tool that may panic; callers
    /// guard this call.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::DryRun`] when the tool rejects the migration.
    fn dry_run(&self, request: &GhostRequest) -> GhostResult<()>;

    /// Starts the row copy in the background.
    ///
    /// The tool marks the context ready to cut over once the copy caught up
    /// and then waits for the postpone flag to be removed.
    ///
    /// # Errors
    ///
    /// Returns a [`GhostError`] when the tool cannot start.
    async fn start(&self, request: &GhostRequest) -> GhostResult<GhostRun>;
}
