//! Task scheduling for database change pipelines.
//!
//! Issues own one pipeline of stages, and each stage holds the tasks that
//! carry out one change on one database. This module admits those tasks
//! under per-instance connection limits, runs them through registered
//! executors, and enforces the task status state machine with its
//! approval and check gating. Status changes cascade to dependent tasks,
//! stages, pipelines and issues. Layout:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - The schedulers and their shared state in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
