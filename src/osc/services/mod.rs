//! Executors coordinating gh-ost migrations.

mod check;
mod cutover;
mod sync;

pub use check::{GhostSyncCheckExecutor, guarded_dry_run};
pub use cutover::GhostCutoverExecutor;
pub use sync::GhostSyncExecutor;
