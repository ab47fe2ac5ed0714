//! When steps for task status transition scenarios.

use super::world::{StatusWorld, TransitionFailure, run_async};
use changeflow::task::{
    domain::{PrincipalId, TaskStatus},
    ports::TaskStatusPatch,
};
use rstest_bdd_macros::when;

#[when(r#"the task is moved to "{target}""#)]
fn move_task(world: &mut StatusWorld, target: String) -> Result<(), eyre::Report> {
    let task = world.task()?.clone();
    let result = match TaskStatus::try_from(target.as_str()) {
        Ok(status) => run_async(world.scheduler.patch_task_status(
            &task,
            TaskStatusPatch::single(task.id(), status, PrincipalId::SYSTEM_BOT),
        ))
        .map_err(TransitionFailure::Rejected),
        Err(err) => Err(TransitionFailure::UnknownStatus(err)),
    };
    if let Ok(updated) = &result {
        world.task = Some(updated.clone());
    }
    world.last_result = Some(result);
    Ok(())
}
