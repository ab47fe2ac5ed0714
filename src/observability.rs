//! Logging initialisation and span helpers.
//!
//! All scheduler diagnostics go through `tracing` with structured fields.
//! Binaries and tests call [`init_logging`] once; the spans below keep the
//! field names consistent across the scheduler and executors.

use crate::task::domain::{Task, TaskCheckRun};
use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs.
    Json,
    /// Pretty-printed logs.
    #[default]
    Pretty,
}

/// Initialises the global subscriber.
///
/// Safe to call more than once; later calls are no-ops. `RUST_LOG`
/// controls levels and defaults to `info`.
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for work on one task.
#[must_use]
pub fn task_span(operation: &str, task: &Task) -> Span {
    tracing::info_span!(
        "task",
        op = operation,
        task_id = %task.id(),
        task_type = %task.task_type(),
        instance_id = %task.instance().id,
    )
}

/// Creates a span for one task check run.
#[must_use]
pub fn check_span(check_run: &TaskCheckRun) -> Span {
    tracing::info_span!(
        "task_check",
        check_run_id = %check_run.id,
        task_id = %check_run.task_id,
        check_type = %check_run.check_type,
    )
}
