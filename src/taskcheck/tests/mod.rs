//! Unit tests for the task check executors and the keyword advisor.
