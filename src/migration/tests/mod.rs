//! Unit tests for the migration ledger.

mod ledger_protocol_tests;
mod memory_driver_tests;
