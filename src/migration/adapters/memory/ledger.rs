//! In-memory migration ledger.

use crate::migration::{
    domain::{MigrationHistory, MigrationHistoryFind, MigrationStatus, PendingMigration},
    ports::{LedgerError, LedgerResult, MigrationLedger},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Thread-safe in-memory ledger.
#[derive(Debug, Clone)]
pub struct InMemoryMigrationLedger {
    state: Arc<RwLock<LedgerState>>,
}

#[derive(Debug)]
struct LedgerState {
    rows: BTreeMap<i64, MigrationHistory>,
    next_id: i64,
    set_up: bool,
}

impl Default for InMemoryMigrationLedger {
    fn default() -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState {
                rows: BTreeMap::new(),
                next_id: 1,
                set_up: true,
            })),
        }
    }
}

fn lock_error(err: impl ToString) -> LedgerError {
    LedgerError::persistence(std::io::Error::other(err.to_string()))
}

impl InMemoryMigrationLedger {
    /// Creates an empty ledger whose table exists.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty ledger whose table has not been created yet.
    #[must_use]
    pub fn without_setup() -> Self {
        let ledger = Self::default();
        if let Ok(mut state) = ledger.state.write() {
            state.set_up = false;
        }
        ledger
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, LedgerState>> {
        self.state.read().map_err(lock_error)
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, LedgerState>> {
        self.state.write().map_err(lock_error)
    }

    /// Returns every row in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] when the lock is poisoned.
    pub fn rows(&self) -> LedgerResult<Vec<MigrationHistory>> {
        Ok(self.read()?.rows.values().cloned().collect())
    }

    /// Stores a finished row directly, assigning the next id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] when the lock is poisoned.
    pub fn seed(&self, pending: &PendingMigration, status: MigrationStatus) -> LedgerResult<i64> {
        let mut state = self.write()?;
        let id = state.next_id;
        state.next_id += 1;
        let mut row = pending_row(id, pending);
        row.status = status;
        state.rows.insert(id, row);
        Ok(id)
    }
}

fn pending_row(id: i64, pending: &PendingMigration) -> MigrationHistory {
    MigrationHistory {
        id,
        created_by: pending.creator.clone(),
        created_at: pending.created_at,
        updated_by: pending.creator.clone(),
        updated_at: pending.created_at,
        release_version: pending.release_version.clone(),
        namespace: pending.namespace.clone(),
        sequence: pending.sequence,
        source: pending.source,
        migration_type: pending.migration_type,
        status: MigrationStatus::Pending,
        version: pending.version.clone(),
        description: pending.description.clone(),
        statement: pending.statement.clone(),
        schema: pending.schema_prev.clone(),
        schema_prev: pending.schema_prev.clone(),
        execution_duration_ns: 0,
        issue_id: pending.issue_id,
        payload: pending.payload.clone(),
    }
}

fn largest_sequence(state: &LedgerState, namespace: &str, baseline_only: bool) -> i64 {
    state
        .rows
        .values()
        .filter(|row| row.namespace == namespace)
        .filter(|row| !baseline_only || row.migration_type.starts_baseline())
        .map(|row| row.sequence)
        .max()
        .unwrap_or(0)
}

#[async_trait]
impl MigrationLedger for InMemoryMigrationLedger {
    async fn needs_setup(&self) -> LedgerResult<bool> {
        Ok(!self.read()?.set_up)
    }

    async fn find_migration_history_list(
        &self,
        find: &MigrationHistoryFind,
    ) -> LedgerResult<Vec<MigrationHistory>> {
        let state = self.read()?;
        let matching = state.rows.values().rev().filter(|row| find.matches(row)).cloned();
        Ok(match find.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn find_largest_sequence(
        &self,
        namespace: &str,
        baseline_only: bool,
    ) -> LedgerResult<i64> {
        Ok(largest_sequence(&*self.read()?, namespace, baseline_only))
    }

    async fn find_largest_version_since_baseline(
        &self,
        namespace: &str,
    ) -> LedgerResult<Option<String>> {
        let state = self.read()?;
        let baseline = largest_sequence(&state, namespace, true);
        Ok(state
            .rows
            .values()
            .filter(|row| row.namespace == namespace && row.sequence >= baseline)
            .map(|row| row.version.clone())
            .max())
    }

    async fn insert_pending_history(&self, pending: &PendingMigration) -> LedgerResult<i64> {
        self.seed(pending, MigrationStatus::Pending)
    }

    async fn update_history_as_done(
        &self,
        id: i64,
        duration_ns: i64,
        updated_schema: &str,
        updated_at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        let mut state = self.write()?;
        let row = state.rows.get_mut(&id).ok_or(LedgerError::NotFound(id))?;
        row.status = MigrationStatus::Done;
        row.execution_duration_ns = duration_ns;
        updated_schema.clone_into(&mut row.schema);
        row.updated_at = updated_at;
        Ok(())
    }

    async fn update_history_as_failed(
        &self,
        id: i64,
        duration_ns: i64,
        updated_at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        let mut state = self.write()?;
        let row = state.rows.get_mut(&id).ok_or(LedgerError::NotFound(id))?;
        row.status = MigrationStatus::Failed;
        row.execution_duration_ns = duration_ns;
        row.updated_at = updated_at;
        Ok(())
    }
}
