//! `PostgreSQL` adapter for the migration ledger.

mod ledger;
pub(crate) mod models;
mod schema;

pub use ledger::{LedgerPgPool, PostgresMigrationLedger};
pub(crate) use ledger::{row_to_history, to_new_row};
