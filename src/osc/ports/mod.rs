//! Port to the gh-ost tool.

mod migrator;

pub use migrator::{GhostMigrator, GhostRequest, GhostRun, ghost_sync_payload};
