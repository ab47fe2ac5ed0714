//! Adapter implementations for migration ports.

pub mod memory;
pub mod postgres;
