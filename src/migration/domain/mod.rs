//! Domain model for the migration ledger.

mod enums;
mod error;
mod history;
mod info;
mod version;

pub use enums::{MigrationSource, MigrationStatus, MigrationType};
pub use error::MigrationError;
pub use history::{MigrationHistory, MigrationHistoryFind, PendingMigration};
pub use info::MigrationInfo;
pub use version::{MigrationVersion, NON_SEMANTIC_PREFIX};
