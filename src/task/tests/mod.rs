//! Unit tests for task scheduling.
//!
//! Tests are organised by concern: the status state machine, check gating,
//! dependency traversal, the scheduler tick, cancellation, completion
//! cascades, the check scheduler, and the in-memory adapters.

mod dag_tests;
