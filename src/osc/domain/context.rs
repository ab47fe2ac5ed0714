//! Live state shared between the gh-ost tool and the coordinating tasks.

use super::{GhostError, GhostResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Progress, heartbeat and cut-over flags of one running gh-ost migration.
///
/// The tool updates the counters and waits on the postpone flag; the sync
/// and cutover executors read the counters and drive the flags.
#[derive(Debug)]
pub struct GhostMigrationContext {
    database: String,
    table_name: String,
    total_rows: AtomicU64,
    copied_rows: AtomicU64,
    heartbeat_lag_ms: AtomicU64,
    postpone_cutover: watch::Sender<bool>,
    ready_to_cut_over: watch::Sender<bool>,
    panic_abort: watch::Sender<Option<String>>,
}

impl GhostMigrationContext {
    /// Creates the context of a migration of `table_name` in `database`.
    ///
    /// Cut-over starts postponed.
    pub fn new(database: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table_name: table_name.into(),
            total_rows: AtomicU64::new(0),
            copied_rows: AtomicU64::new(0),
            heartbeat_lag_ms: AtomicU64::new(0),
            postpone_cutover: watch::Sender::new(true),
            ready_to_cut_over: watch::Sender::new(false),
            panic_abort: watch::Sender::new(None),
        }
    }

    /// Returns the database holding the table.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the table being migrated.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Records the estimated number of rows to copy.
    pub fn set_total_rows(&self, total: u64) {
        self.total_rows.store(total, Ordering::Release);
    }

    /// Adds `rows` to the copied row count.
    pub fn add_copied_rows(&self, rows: u64) {
        self.copied_rows.fetch_add(rows, Ordering::AcqRel);
    }

    /// Returns `(copied, total)` rows.
    #[must_use]
    pub fn row_copy_progress(&self) -> (u64, u64) {
        (
            self.copied_rows.load(Ordering::Acquire),
            self.total_rows.load(Ordering::Acquire),
        )
    }

    /// Records the latest replication heartbeat lag.
    pub fn set_heartbeat_lag(&self, lag: Duration) {
        let millis = u64::try_from(lag.as_millis()).unwrap_or(u64::MAX);
        self.heartbeat_lag_ms.store(millis, Ordering::Release);
    }

    /// Returns the latest replication heartbeat lag.
    #[must_use]
    pub fn heartbeat_lag(&self) -> Duration {
        Duration::from_millis(self.heartbeat_lag_ms.load(Ordering::Acquire))
    }

    /// Returns whether the final table swap is still held back.
    #[must_use]
    pub fn is_cutover_postponed(&self) -> bool {
        *self.postpone_cutover.borrow()
    }

    /// Removes the postpone flag so the tool performs the table swap.
    pub fn release_cutover(&self) {
        self.postpone_cutover.send_replace(false);
    }

    /// Waits until [`Self::release_cutover`] was called.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::ToolExited`] when the flag can no longer change.
    pub async fn wait_for_cutover_release(&self) -> GhostResult<()> {
        let mut released = self.postpone_cutover.subscribe();
        released
            .wait_for(|postponed| !*postponed)
            .await
            .map(|_| ())
            .map_err(|_| GhostError::ToolExited)
    }

    /// Signals that the row copy caught up and the tool waits for cut-over.
    pub fn mark_ready_to_cut_over(&self) {
        self.ready_to_cut_over.send_replace(true);
    }

    /// Returns whether the tool waits for cut-over.
    #[must_use]
    pub fn is_ready_to_cut_over(&self) -> bool {
        *self.ready_to_cut_over.borrow()
    }

    /// Waits until the tool is ready to cut over.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::ToolExited`] when the flag can no longer change.
    pub async fn wait_until_ready_to_cut_over(&self) -> GhostResult<()> {
        let mut ready = self.ready_to_cut_over.subscribe();
        ready
            .wait_for(|is_ready| *is_ready)
            .await
            .map(|_| ())
            .map_err(|_| GhostError::ToolExited)
    }

    /// Sends `reason` on the panic-abort channel. Only the first reason is
    /// kept.
    pub fn abort(&self, reason: impl Into<String>) {
        let message = reason.into();
        self.panic_abort.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(message);
            true
        });
    }

    /// Returns the abort reason, if the migration was aborted.
    #[must_use]
    pub fn abort_reason(&self) -> Option<String> {
        self.panic_abort.borrow().clone()
    }

    /// Waits until the migration is aborted and returns the reason.
    pub async fn aborted(&self) -> String {
        let mut abort = self.panic_abort.subscribe();
        abort.wait_for(Option::is_some).await.map_or_else(
            |_| String::new(),
            |reason| reason.clone().unwrap_or_default(),
        )
    }
}
