//! Adapter implementations for task scheduling ports.

pub mod memory;
