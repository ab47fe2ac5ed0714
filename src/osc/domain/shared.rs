//! Slot handing a parked gh-ost migration from the sync task to the cutover
//! task.

use super::{GhostError, GhostMigrationContext, GhostResult};
use crate::task::domain::TaskId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

/// A migration parked by its sync task: the live context and the channel
/// the tool reports its final outcome on.
#[derive(Debug, Clone)]
pub struct SharedGhostState {
    context: Arc<GhostMigrationContext>,
    outcome: Arc<Mutex<Option<oneshot::Receiver<GhostResult<()>>>>>,
}

impl SharedGhostState {
    /// Wraps a running migration.
    #[must_use]
    pub fn new(
        context: Arc<GhostMigrationContext>,
        outcome: oneshot::Receiver<GhostResult<()>>,
    ) -> Self {
        Self {
            context,
            outcome: Arc::new(Mutex::new(Some(outcome))),
        }
    }

    /// Returns the migration context.
    #[must_use]
    pub const fn context(&self) -> &Arc<GhostMigrationContext> {
        &self.context
    }

    /// Waits for the tool's final outcome. The outcome can be awaited once.
    ///
    /// # Errors
    ///
    /// Returns the tool's error, [`GhostError::ToolExited`] when it stopped
    /// without reporting, and [`GhostError::OutcomeConsumed`] on a second
    /// call.
    pub async fn wait_for_outcome(&self) -> GhostResult<()> {
        let receiver = self
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(GhostError::OutcomeConsumed)?;
        receiver.await.unwrap_or(Err(GhostError::ToolExited))
    }
}

/// Shared slots keyed by the id of the sync task that parked them.
///
/// A slot is inserted once by the sync task, read by the cutover task and
/// removed when the cutover finishes.
#[derive(Debug, Default)]
pub struct GhostStateRegistry {
    slots: Mutex<HashMap<TaskId, SharedGhostState>>,
}

impl GhostStateRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, SharedGhostState>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Parks `state` under `sync_task_id`.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::SharedStateExists`] when the slot is taken.
    pub fn insert(&self, sync_task_id: TaskId, state: SharedGhostState) -> GhostResult<()> {
        let mut slots = self.lock();
        if slots.contains_key(&sync_task_id) {
            return Err(GhostError::SharedStateExists(sync_task_id));
        }
        slots.insert(sync_task_id, state);
        Ok(())
    }

    /// Returns the state parked under `sync_task_id`.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::SharedStateNotFound`] when the slot is empty.
    pub fn get(&self, sync_task_id: TaskId) -> GhostResult<SharedGhostState> {
        self.lock()
            .get(&sync_task_id)
            .cloned()
            .ok_or(GhostError::SharedStateNotFound(sync_task_id))
    }

    /// Deletes the slot of `sync_task_id` and returns its state.
    pub fn remove(&self, sync_task_id: TaskId) -> Option<SharedGhostState> {
        self.lock().remove(&sync_task_id)
    }

    /// Returns the number of parked migrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns whether no migration is parked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
