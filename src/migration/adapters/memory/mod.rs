//! In-memory adapters for the migration ports.

mod backup;
mod driver;
mod ledger;

pub use backup::InMemoryBackupStorage;
pub use driver::{InMemoryDriver, InMemoryDriverFactory, InMemoryInstance};
pub use ledger::InMemoryMigrationLedger;
