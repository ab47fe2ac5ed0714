//! Task check executors.

mod connect;
mod statement;

pub use connect::{DatabaseConnectCheckExecutor, MigrationSchemaCheckExecutor};
pub use statement::{
    StatementAdviseCheckExecutor, StatementSyntaxCheckExecutor, StatementTypeCheckExecutor,
};
