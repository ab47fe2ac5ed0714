//! Online schema change coordination for gh-ost migrations.
//!
//! A gh-ost change runs as two tasks joined by a dependency edge. The sync
//! task starts the row copy and parks the running tool in a shared slot
//! once it is ready to cut over; the cutover task picks the slot up,
//! records the change in the migration ledger and lets the tool finish the
//! table swap.
//!
//! - Migration context, shared slot and errors in [`domain`]
//! - The [`ports::GhostMigrator`] port in [`ports`]
//! - A simulated migrator in [`adapters`]
//! - Sync, cutover and check executors in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
