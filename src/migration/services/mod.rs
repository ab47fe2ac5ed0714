//! Application services for the migration ledger.

mod ledger;
mod task_info;

pub use ledger::{MigrationExecution, MigrationRunError, MigrationService};
pub use task_info::task_migration_info;
