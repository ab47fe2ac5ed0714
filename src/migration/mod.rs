//! Migration ledger for applied database changes.
//!
//! Every schema or data change executed against a target database is
//! recorded as a history row in that database's ledger. The ledger makes
//! retries idempotent and keeps the semantic version of each namespace
//! monotonic. Layout:
//!
//! - Domain types in [`domain`]
//! - Driver, ledger and backup storage ports in [`ports`]
//! - In-memory and `PostgreSQL` adapters in [`adapters`]
//! - The begin/execute/end protocol in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
