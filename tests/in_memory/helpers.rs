//! Shared world for the in-memory integration tests.
//!
//! Builds one `MySQL` instance holding database `app`, an issue owning a
//! one-stage pipeline with automatic approval, and both schedulers wired to
//! the real executors.

use changeflow::config::SchedulerConfig;
use changeflow::migration::{
    adapters::memory::{InMemoryBackupStorage, InMemoryDriverFactory, InMemoryInstance},
    domain::MigrationHistory,
    ports::DriverFactory,
};
use changeflow::observability::{LogFormat, init_logging};
use changeflow::osc::{
    adapters::SimulatedGhostMigrator,
    domain::GhostStateRegistry,
    services::{GhostCutoverExecutor, GhostSyncCheckExecutor, GhostSyncExecutor},
};
use changeflow::task::{
    adapters::memory::{InMemoryActivityManager, InMemoryApprovalCanceller, InMemoryTaskStore},
    domain::{
        ApprovalPolicy, DatabaseId, DatabaseRef, Engine, EnvironmentId, InstanceId, InstanceRef,
        Issue, IssueId, IssueStatus, IssueWorkflow, Pipeline, PipelineId, PipelineStatus,
        Principal, PrincipalId, ProjectId, Stage, StageId, Task, TaskCheckType, TaskData, TaskId,
        TaskPayload, TaskStatus, TaskType, WorkspaceRole,
    },
    ports::{TaskExecutor, TaskStore},
    services::{
        ExecutorRegistry, Scheduler, TaskCheckExecutorRegistry, TaskCheckScheduler,
        TaskProgressBoard,
    },
};
use changeflow::taskcheck::{
    adapters::KeywordStatementAdvisor,
    ports::StatementAdvisor,
    services::{
        DatabaseConnectCheckExecutor, MigrationSchemaCheckExecutor,
        StatementAdviseCheckExecutor, StatementSyntaxCheckExecutor, StatementTypeCheckExecutor,
    },
};
use changeflow::taskrun::{
    BackupExecutor, MigrateExecutor, PitrCutoverExecutor, PitrRestoreExecutor,
};
use chrono::Utc;
use eyre::bail;
use mockable::DefaultClock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Instance every task runs against.
pub const INSTANCE: InstanceId = InstanceId::new(1);
/// Pipeline owned by the issue.
pub const PIPELINE: PipelineId = PipelineId::new(1);
/// The pipeline's only stage.
pub const STAGE: StageId = StageId::new(10);
/// Environment of the stage.
pub const ENVIRONMENT: EnvironmentId = EnvironmentId::new(100);
/// Issue owning the pipeline.
pub const ISSUE: IssueId = IssueId::new(1000);
/// Principal creating and owning every task.
pub const CREATOR: PrincipalId = PrincipalId::new(42);
/// Database seeded on the instance.
pub const DATABASE: &str = "app";

/// Scheduler type driven by the tests.
pub type RolloutScheduler =
    Scheduler<InMemoryTaskStore, InMemoryActivityManager, InMemoryApprovalCanceller, DefaultClock>;

/// Everything a rollout needs, backed by in-memory adapters.
pub struct Rollout {
    /// Task store shared by both schedulers and the executors.
    pub store: Arc<InMemoryTaskStore>,
    /// Activities emitted by the scheduler.
    pub activities: Arc<InMemoryActivityManager>,
    /// The target instance.
    pub instance: InMemoryInstance,
    /// Backup storage used by backup and restore tasks.
    pub storage: Arc<InMemoryBackupStorage>,
    /// gh-ost stand-in.
    pub migrator: SimulatedGhostMigrator,
    /// Slots parked by gh-ost sync tasks.
    pub ghost_states: Arc<GhostStateRegistry>,
    /// The task scheduler.
    pub scheduler: RolloutScheduler,
    /// The task check scheduler.
    pub checks: TaskCheckScheduler<InMemoryTaskStore>,
    drivers: Arc<dyn DriverFactory>,
}

fn instance_ref() -> InstanceRef {
    InstanceRef {
        id: INSTANCE,
        name: "primary".to_owned(),
        environment_id: ENVIRONMENT,
        engine: Engine::Mysql,
        archived: false,
    }
}

fn executors(
    store: &Arc<InMemoryTaskStore>,
    drivers: &Arc<dyn DriverFactory>,
    storage: &Arc<InMemoryBackupStorage>,
    ghost: (&SimulatedGhostMigrator, &Arc<GhostStateRegistry>, &Arc<TaskProgressBoard>),
    config: &SchedulerConfig,
) -> eyre::Result<ExecutorRegistry> {
    let (migrator, ghost_states, progress) = ghost;
    let clock = Arc::new(DefaultClock);
    let migrate: Arc<dyn TaskExecutor> = Arc::new(MigrateExecutor::new(
        Arc::clone(store),
        Arc::clone(drivers),
        Arc::clone(&clock),
        config,
    ));
    Ok(ExecutorRegistry::new()
        .register(TaskType::DatabaseCreate, Arc::clone(&migrate))?
        .register(TaskType::SchemaUpdate, Arc::clone(&migrate))?
        .register(TaskType::DataUpdate, migrate)?
        .register(
            TaskType::SchemaUpdateGhostSync,
            Arc::new(GhostSyncExecutor::new(
                Arc::new(migrator.clone()),
                Arc::clone(ghost_states),
                Arc::clone(progress),
                config.ghost,
                Arc::clone(&clock),
            )),
        )?
        .register(
            TaskType::SchemaUpdateGhostCutover,
            Arc::new(GhostCutoverExecutor::new(
                Arc::clone(store),
                Arc::clone(ghost_states),
                Arc::clone(drivers),
                Arc::clone(&clock),
                config,
            )),
        )?
        .register(
            TaskType::DatabaseBackup,
            Arc::new(BackupExecutor::new(Arc::clone(drivers), storage.clone())),
        )?
        .register(
            TaskType::PitrRestore,
            Arc::new(PitrRestoreExecutor::new(
                Arc::clone(store),
                Arc::clone(drivers),
                storage.clone(),
                clock,
                config,
            )),
        )?
        .register(
            TaskType::PitrCutover,
            Arc::new(PitrCutoverExecutor::new(Arc::clone(drivers), config)),
        )?)
}

fn check_executors(
    drivers: &Arc<dyn DriverFactory>,
    migrator: &SimulatedGhostMigrator,
) -> eyre::Result<TaskCheckExecutorRegistry> {
    let advisor: Arc<dyn StatementAdvisor> = Arc::new(KeywordStatementAdvisor::new());
    Ok(TaskCheckExecutorRegistry::new()
        .register(
            TaskCheckType::DatabaseConnect,
            Arc::new(DatabaseConnectCheckExecutor::new(Arc::clone(drivers))),
        )?
        .register(
            TaskCheckType::InstanceMigrationSchema,
            Arc::new(MigrationSchemaCheckExecutor::new(Arc::clone(drivers))),
        )?
        .register(
            TaskCheckType::StatementSyntax,
            Arc::new(StatementSyntaxCheckExecutor::new(Arc::clone(&advisor))),
        )?
        .register(
            TaskCheckType::StatementAdvise,
            Arc::new(StatementAdviseCheckExecutor::new(Arc::clone(&advisor))),
        )?
        .register(
            TaskCheckType::StatementType,
            Arc::new(StatementTypeCheckExecutor::new(advisor)),
        )?
        .register(
            TaskCheckType::GhostSync,
            Arc::new(GhostSyncCheckExecutor::new(Arc::new(migrator.clone()))),
        )?)
}

impl Rollout {
    /// Builds the world with `SchedulerConfig::fast()`.
    ///
    /// # Errors
    ///
    /// Returns an error when seeding the in-memory adapters fails.
    pub fn build() -> eyre::Result<Self> {
        Self::build_with(|migrator| migrator)
    }

    /// Builds the world with a gh-ost stand-in adjusted by `configure`.
    ///
    /// # Errors
    ///
    /// Returns an error when seeding the in-memory adapters fails.
    pub fn build_with(
        configure: impl FnOnce(SimulatedGhostMigrator) -> SimulatedGhostMigrator,
    ) -> eyre::Result<Self> {
        init_logging(LogFormat::Pretty);
        let instance = InMemoryInstance::new("primary", Engine::Mysql);
        instance.create_database(DATABASE)?;
        let factory = InMemoryDriverFactory::new();
        factory.register(INSTANCE, instance.clone())?;
        let drivers: Arc<dyn DriverFactory> = Arc::new(factory);

        let store = Arc::new(InMemoryTaskStore::new());
        store.insert_pipeline(Pipeline {
            id: PIPELINE,
            name: "rollout".to_owned(),
            status: PipelineStatus::Open,
            stages: vec![Stage {
                id: STAGE,
                name: "prod".to_owned(),
                environment_id: ENVIRONMENT,
                tasks: Vec::new(),
            }],
        })?;
        store.insert_issue(Issue {
            id: ISSUE,
            name: "Add orders table".to_owned(),
            status: IssueStatus::Open,
            pipeline_id: PIPELINE,
            project_id: ProjectId::new(5),
            assignee_id: CREATOR,
            assignee_need_attention: true,
            workflow: IssueWorkflow::Ui,
            created_at: Utc::now(),
        })?;
        store.insert_principal(Principal {
            id: CREATOR,
            name: "Ada".to_owned(),
            role: WorkspaceRole::Dba,
        })?;
        store.set_approval_policy(ENVIRONMENT, ApprovalPolicy::automatic())?;

        let config = SchedulerConfig::fast();
        let activities = Arc::new(InMemoryActivityManager::new());
        let storage = Arc::new(InMemoryBackupStorage::new());
        let migrator = configure(SimulatedGhostMigrator::new(Arc::clone(&drivers)));
        let ghost_states = Arc::new(GhostStateRegistry::new());

        let progress = Arc::new(TaskProgressBoard::new());
        let registry = executors(
            &store,
            &drivers,
            &storage,
            (&migrator, &ghost_states, &progress),
            &config,
        )?;
        let scheduler = Scheduler::new(
            Arc::clone(&store),
            Arc::clone(&activities),
            Arc::new(InMemoryApprovalCanceller::new()),
            Arc::new(DefaultClock),
            registry,
            config.clone(),
        )
        .with_progress(progress);
        let checks = TaskCheckScheduler::new(
            Arc::clone(&store),
            check_executors(&drivers, &migrator)?,
            scheduler.state(),
            config,
        );

        Ok(Self {
            store,
            activities,
            instance,
            storage,
            migrator,
            ghost_states,
            scheduler,
            checks,
            drivers,
        })
    }

    /// Stores a task awaiting approval in the pipeline's only stage.
    ///
    /// # Errors
    ///
    /// Returns an error when the task is invalid or cannot be stored.
    pub fn add_task(
        &self,
        id: i64,
        payload: TaskPayload,
        blocked_by: &[i64],
    ) -> eyre::Result<Task> {
        let data = TaskData::new(
            TaskId::new(id),
            format!("task-{id}"),
            PIPELINE,
            STAGE,
            instance_ref(),
            payload,
            Utc::now(),
        )
        .with_status(TaskStatus::PendingApproval)
        .with_creator(CREATOR)
        .with_database(DatabaseRef {
            id: DatabaseId::new(1),
            name: DATABASE.to_owned(),
            project_id: ProjectId::new(5),
        })
        .with_blocked_by(blocked_by.iter().copied().map(TaskId::new));
        let task = Task::from_data(data)?;
        for blocker in blocked_by {
            self.store.insert_dag(TaskId::new(*blocker), task.id())?;
        }
        self.store.insert_task(task.clone())?;
        Ok(task)
    }

    /// Executes `statement` against `database` outside any task.
    ///
    /// # Errors
    ///
    /// Returns an error when the driver cannot be opened or the statement
    /// fails.
    pub async fn seed(&self, database: &str, statement: &str) -> eyre::Result<()> {
        let driver = self.drivers.open(&instance_ref(), Some(database)).await?;
        let executed = driver.execute(statement, false).await;
        driver.close().await;
        executed?;
        Ok(())
    }

    /// Dumps the schema and rows of `database`.
    ///
    /// # Errors
    ///
    /// Returns an error when the dump fails.
    pub async fn dump(&self, database: &str) -> eyre::Result<String> {
        let driver = self.drivers.open(&instance_ref(), None).await?;
        let dumped = driver.dump(database, false).await;
        driver.close().await;
        Ok(dumped?)
    }

    /// Returns the instance's migration ledger rows.
    ///
    /// # Errors
    ///
    /// Returns an error when the ledger lock is poisoned.
    pub fn history(&self) -> eyre::Result<Vec<MigrationHistory>> {
        Ok(self.instance.ledger().rows()?)
    }

    /// Returns the current status of task `id`.
    ///
    /// # Errors
    ///
    /// Returns an error when the task does not exist.
    pub async fn status_of(&self, id: i64) -> eyre::Result<TaskStatus> {
        self.store
            .get_task(TaskId::new(id))
            .await?
            .map(|task| task.status())
            .ok_or_else(|| eyre::eyre!("task {id} should exist"))
    }

    /// Ticks both schedulers until task `id` reaches `expected` or three
    /// seconds pass.
    ///
    /// # Errors
    ///
    /// Returns an error when a tick fails, the task fails, or the deadline
    /// passes.
    pub async fn drive_until(&self, id: i64, expected: TaskStatus) -> eyre::Result<()> {
        let root = CancellationToken::new();
        for _ in 0..300 {
            self.checks.tick(&root).await?;
            self.scheduler.tick(&root).await?;
            let status = self.status_of(id).await?;
            if status == expected {
                return Ok(());
            }
            if status == TaskStatus::Failed && expected != TaskStatus::Failed {
                let records = self.store.run_records(TaskId::new(id))?;
                bail!("task {id} failed: {records:?}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let status = self.status_of(id).await?;
        bail!("task {id} stayed {status}, expected {expected}")
    }
}
