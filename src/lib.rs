//! Changeflow: a task scheduler for database change pipelines.
//!
//! Issues carry a pipeline of stages whose tasks create databases, apply
//! schema and data changes, take backups, restore to a point in time, and
//! drive online schema changes. The scheduler admits runnable tasks under
//! per-instance connection limits, gates them on approval and task checks,
//! dispatches them to registered executors, and cascades every status
//! change through dependents, stages, pipelines and issues.
//!
//! # Architecture
//!
//! Each bounded context follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (in-memory, `PostgreSQL`)
//! - **Services**: Orchestration over the ports
//!
//! # Modules
//!
//! - [`task`]: Task model, status state machine and the schedulers
//! - [`migration`]: Migration ledger protocol and database drivers
//! - [`osc`]: Online schema change coordination through gh-ost
//! - [`taskrun`]: Executors for statement, backup and restore tasks
//! - [`taskcheck`]: Task check executors
//! - [`config`]: Scheduler configuration
//! - [`observability`]: Logging initialisation and span helpers

pub mod config;
pub mod migration;
pub mod observability;
pub mod osc;
pub mod task;
pub mod taskcheck;
pub mod taskrun;
