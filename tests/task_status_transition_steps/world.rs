//! Shared world state for task status transition scenarios.

use async_trait::async_trait;
use changeflow::config::SchedulerConfig;
use changeflow::task::{
    adapters::memory::{InMemoryActivityManager, InMemoryApprovalCanceller, InMemoryTaskStore},
    domain::{
        Engine, EnvironmentId, InstanceId, InstanceRef, ParseTaskEnumError, Pipeline, PipelineId,
        PipelineStatus, Stage, StageId, Task, TaskRunResult, TaskType,
    },
    ports::{CancellationSupport, ExecutionOutcome, TaskExecutor},
    services::{ExecutorRegistry, Scheduler, SchedulerError},
};
use mockable::DefaultClock;
use rstest::fixture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Pipeline holding every scenario task.
pub const PIPELINE: PipelineId = PipelineId::new(1);
/// The pipeline's only stage.
pub const STAGE: StageId = StageId::new(10);

/// Scheduler type used by the scenarios.
pub type StatusScheduler =
    Scheduler<InMemoryTaskStore, InMemoryActivityManager, InMemoryApprovalCanceller, DefaultClock>;

/// Why a requested transition did not happen.
#[derive(Debug)]
pub enum TransitionFailure {
    /// The requested status name is not a task status.
    UnknownStatus(ParseTaskEnumError),
    /// The scheduler rejected the patch.
    Rejected(SchedulerError),
}

/// Backup executor that supports cooperative cancellation.
struct StoppableBackup;

#[async_trait]
impl TaskExecutor for StoppableBackup {
    fn cancellation(&self) -> CancellationSupport {
        CancellationSupport::Cooperative
    }

    async fn run_once(&self, ctx: &CancellationToken, _task: &Task) -> ExecutionOutcome {
        ctx.cancelled().await;
        ExecutionOutcome::Done(TaskRunResult::detail("stopped"))
    }
}

/// Scenario world for task status transitions.
pub struct StatusWorld {
    pub store: Arc<InMemoryTaskStore>,
    pub activities: Arc<InMemoryActivityManager>,
    pub scheduler: StatusScheduler,
    pub task: Option<Task>,
    pub dependent: Option<Task>,
    pub last_result: Option<Result<Task, TransitionFailure>>,
}

impl StatusWorld {
    /// Creates a world whose registry can cancel backups only.
    ///
    /// # Errors
    ///
    /// Returns an error when the registry or the pipeline cannot be set up.
    pub fn new() -> Result<Self, eyre::Report> {
        let store = Arc::new(InMemoryTaskStore::new());
        store.insert_pipeline(Pipeline {
            id: PIPELINE,
            name: "rollout".to_owned(),
            status: PipelineStatus::Open,
            stages: vec![Stage {
                id: STAGE,
                name: "prod".to_owned(),
                environment_id: EnvironmentId::new(100),
                tasks: Vec::new(),
            }],
        })?;
        let activities = Arc::new(InMemoryActivityManager::new());
        let registry = ExecutorRegistry::new()
            .register(TaskType::DatabaseBackup, Arc::new(StoppableBackup))?;
        let scheduler = Scheduler::new(
            Arc::clone(&store),
            Arc::clone(&activities),
            Arc::new(InMemoryApprovalCanceller::new()),
            Arc::new(DefaultClock),
            registry,
            SchedulerConfig::fast(),
        );
        Ok(Self {
            store,
            activities,
            scheduler,
            task: None,
            dependent: None,
            last_result: None,
        })
    }

    /// Returns the scenario's main task.
    ///
    /// # Errors
    ///
    /// Returns an error when no task was created yet.
    pub fn task(&self) -> Result<&Task, eyre::Report> {
        self.task
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing task in scenario world"))
    }
}

/// Instance every scenario task runs against.
#[must_use]
pub fn instance() -> InstanceRef {
    InstanceRef {
        id: InstanceId::new(1),
        name: "primary".to_owned(),
        environment_id: EnvironmentId::new(100),
        engine: Engine::Mysql,
        archived: false,
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> StatusWorld {
    match StatusWorld::new() {
        Ok(world) => world,
        Err(err) => panic!("scenario world setup failed: {err}"),
    }
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
