//! Given steps for task status transition scenarios.

use super::world::{PIPELINE, STAGE, StatusWorld, instance};
use changeflow::task::domain::{
    BackupPayload, MigrationPayload, Task, TaskData, TaskId, TaskPayload, TaskStatus, TaskType,
};
use chrono::Utc;
use rstest_bdd_macros::given;

fn payload_for(task_type: TaskType) -> Result<TaskPayload, eyre::Report> {
    match task_type {
        TaskType::SchemaUpdate => Ok(TaskPayload::SchemaUpdate(MigrationPayload::new(
            "CREATE TABLE orders (id INT)",
            "20240101",
        ))),
        TaskType::DatabaseBackup => Ok(TaskPayload::DatabaseBackup(BackupPayload {
            backup_name: "nightly".to_owned(),
        })),
        other => Err(eyre::eyre!("no scenario payload for {other} tasks")),
    }
}

fn build_task(id: i64, payload: TaskPayload, status: TaskStatus) -> Result<Task, eyre::Report> {
    let data = TaskData::new(
        TaskId::new(id),
        format!("task-{id}"),
        PIPELINE,
        STAGE,
        instance(),
        payload,
        Utc::now(),
    )
    .with_status(status);
    Ok(Task::from_data(data)?)
}

#[given(r#"a "{task_type}" task in status "{status}""#)]
fn task_in_status(
    world: &mut StatusWorld,
    task_type: String,
    status: String,
) -> Result<(), eyre::Report> {
    let parsed_type = TaskType::try_from(task_type.as_str())?;
    let parsed_status = TaskStatus::try_from(status.as_str())?;
    let task = build_task(1, payload_for(parsed_type)?, parsed_status)?;
    world.store.insert_task(task.clone())?;
    world.task = Some(task);
    Ok(())
}

#[given("a dependent task awaiting approval")]
fn dependent_task(world: &mut StatusWorld) -> Result<(), eyre::Report> {
    let upstream = world.task()?.id();
    let dependent = build_task(
        2,
        TaskPayload::DatabaseBackup(BackupPayload {
            backup_name: "after".to_owned(),
        }),
        TaskStatus::PendingApproval,
    )?;
    world.store.insert_task(dependent.clone())?;
    world.store.insert_dag(upstream, dependent.id())?;
    world.dependent = Some(dependent);
    Ok(())
}
