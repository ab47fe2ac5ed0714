//! Domain types for gh-ost coordination.

mod context;
mod error;
mod shared;

pub use context::GhostMigrationContext;
pub use error::{GhostError, GhostResult};
pub use shared::{GhostStateRegistry, SharedGhostState};
