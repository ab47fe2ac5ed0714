//! Adapters for the gh-ost port.

mod simulated;

pub use simulated::SimulatedGhostMigrator;
