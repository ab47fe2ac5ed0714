//! Unit tests for gh-ost coordination.
