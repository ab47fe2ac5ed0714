//! Application services for task scheduling.

mod check_scheduler;
mod gate;
mod registry;
mod scheduler;
mod state;
mod status;

pub use check_scheduler::TaskCheckScheduler;
pub use gate::{TaskCheckGate, blocking_checks};
pub use registry::{ExecutorRegistry, RegistryError, TaskCheckExecutorRegistry};
pub use scheduler::{Scheduler, SchedulerError};
pub(crate) use scheduler::join_error_message;
pub use state::{SchedulerState, TaskProgressBoard};
