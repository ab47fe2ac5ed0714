//! Port contracts for the migration ledger and target databases.

pub mod backup;
pub mod driver;
pub mod ledger;

pub use backup::{BackupStorage, BackupStorageError, BackupStorageResult};
pub use driver::{Driver, DriverError, DriverFactory, DriverResult};
pub use ledger::{LedgerError, LedgerResult, MigrationLedger};
