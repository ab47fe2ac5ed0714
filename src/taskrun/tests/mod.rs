//! Unit tests for the statement, backup and restore executors.

mod migrate_tests;
mod restore_tests;
