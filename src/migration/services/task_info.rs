//! Ledger metadata derived from the task that runs a migration.

use crate::migration::domain::{MigrationInfo, MigrationSource, MigrationVersion};
use crate::task::{
    domain::{IssueWorkflow, Task},
    ports::{TaskStore, TaskStoreResult},
};

/// Builds the [`MigrationInfo`] for a migration executed by `task`.
///
/// The issue owning the task's pipeline supplies the issue id, the
/// description and the source; the task creator's display name is recorded
/// as the creator.
///
/// # Errors
///
/// Returns the store error when the issue or the creator cannot be read.
pub async fn task_migration_info<S>(
    store: &S,
    task: &Task,
    database: &str,
    version: MigrationVersion,
    release_version: &str,
) -> TaskStoreResult<MigrationInfo>
where
    S: TaskStore + ?Sized,
{
    let issue = store.get_issue_by_pipeline_id(task.pipeline_id()).await?;
    let creator = store
        .get_principal(task.creator_id())
        .await?
        .map_or_else(|| task.creator_id().to_string(), |principal| principal.name);
    let source = match issue.as_ref().map(|found| found.workflow) {
        Some(IssueWorkflow::Vcs) => MigrationSource::Vcs,
        Some(IssueWorkflow::Ui) | None => MigrationSource::Ui,
    };
    let description = issue
        .as_ref()
        .map_or_else(|| task.name().to_owned(), |found| found.name.clone());

    Ok(MigrationInfo::new(database, version)
        .with_source(source)
        .with_issue(issue.map(|found| found.id))
        .with_description(description)
        .with_creator(creator)
        .with_release_version(release_version))
}
