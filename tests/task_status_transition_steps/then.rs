//! Then steps for task status transition scenarios.

use super::world::{StatusWorld, TransitionFailure, run_async};
use changeflow::task::{
    domain::{ActivityType, Task, TaskDomainError, TaskId, TaskStatus},
    ports::TaskStore,
    services::SchedulerError,
};
use rstest_bdd_macros::then;

fn stored_status(world: &StatusWorld, id: TaskId) -> Result<TaskStatus, eyre::Report> {
    run_async(world.store.get_task(id))?
        .map(|task| task.status())
        .ok_or_else(|| eyre::eyre!("task {id} should exist"))
}

fn last_result(world: &StatusWorld) -> Result<&Result<Task, TransitionFailure>, eyre::Report> {
    world
        .last_result
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing transition result"))
}

#[then(r#"the task status is "{status}""#)]
fn task_status_is(world: &StatusWorld, status: String) -> Result<(), eyre::Report> {
    let expected = TaskStatus::try_from(status.as_str())?;
    let actual = stored_status(world, world.task()?.id())?;
    if actual != expected {
        return Err(eyre::eyre!("expected status {expected}, found {actual}"));
    }
    Ok(())
}

#[then(r#"the dependent task status is "{status}""#)]
fn dependent_status_is(world: &StatusWorld, status: String) -> Result<(), eyre::Report> {
    let expected = TaskStatus::try_from(status.as_str())?;
    let dependent = world
        .dependent
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing dependent task"))?;
    let actual = stored_status(world, dependent.id())?;
    if actual != expected {
        return Err(eyre::eyre!("expected dependent status {expected}, found {actual}"));
    }
    Ok(())
}

#[then("a status update activity is recorded")]
fn status_update_recorded(world: &StatusWorld) -> Result<(), eyre::Report> {
    let updates = world.activities.activities_of(ActivityType::TaskStatusUpdate)?;
    if updates.len() != 1 {
        return Err(eyre::eyre!("expected one status update, found {}", updates.len()));
    }
    Ok(())
}

#[then("the transition fails with an invalid status transition error")]
fn fails_with_invalid_transition(world: &StatusWorld) -> Result<(), eyre::Report> {
    let result = last_result(world)?;
    if !matches!(
        result,
        Err(TransitionFailure::Rejected(SchedulerError::Domain(
            TaskDomainError::InvalidStatusTransition { .. }
        )))
    ) {
        return Err(eyre::eyre!("expected InvalidStatusTransition, got {result:?}"));
    }
    Ok(())
}

#[then("the transition fails because cancellation is not implemented")]
fn fails_without_cancellation(world: &StatusWorld) -> Result<(), eyre::Report> {
    let result = last_result(world)?;
    if !matches!(
        result,
        Err(TransitionFailure::Rejected(SchedulerError::Domain(
            TaskDomainError::CancellationNotImplemented { .. }
        )))
    ) {
        return Err(eyre::eyre!("expected CancellationNotImplemented, got {result:?}"));
    }
    Ok(())
}

#[then("the transition fails with an unknown status error")]
fn fails_with_unknown_status(world: &StatusWorld) -> Result<(), eyre::Report> {
    let result = last_result(world)?;
    if !matches!(result, Err(TransitionFailure::UnknownStatus(_))) {
        return Err(eyre::eyre!("expected an unknown status error, got {result:?}"));
    }
    Ok(())
}
