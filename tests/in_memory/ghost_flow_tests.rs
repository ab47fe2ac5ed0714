//! gh-ost sync and cutover tasks driven by the schedulers.

use super::helpers::{CREATOR, DATABASE, ENVIRONMENT, ISSUE, Rollout};
use changeflow::migration::domain::MigrationType;
use changeflow::task::{
    domain::{ApprovalPolicy, GhostSyncPayload, IssueStatus, TaskId, TaskPayload, TaskStatus},
    ports::{TaskStatusPatch, TaskStore},
};
use eyre::{bail, ensure};
use rstest::rstest;
use std::time::Duration;

fn sync_payload() -> TaskPayload {
    TaskPayload::SchemaUpdateGhostSync(GhostSyncPayload {
        statement: "ALTER TABLE orders ADD COLUMN note TEXT".to_owned(),
        schema_version: "20240101000000".to_owned(),
        table_name: "orders".to_owned(),
        alter_statement: "ADD COLUMN note TEXT".to_owned(),
    })
}

/// Adds the sync task and the cutover task depending on it.
async fn ghost_pipeline(rollout: &Rollout) -> eyre::Result<()> {
    rollout.seed(DATABASE, "CREATE TABLE `orders` (id INT PRIMARY KEY)").await?;
    let sync = rollout.add_task(1, sync_payload(), &[])?;
    rollout.add_task(2, TaskPayload::SchemaUpdateGhostCutover, &[1])?;
    let runs = rollout.scheduler.schedule_task_checks(&sync, CREATOR).await?;
    ensure!(runs.len() == 5, "gh-ost dry run joins the statement checks: {runs:?}");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sync_and_cutover_apply_the_change() -> eyre::Result<()> {
    let rollout = Rollout::build()?;
    ghost_pipeline(&rollout).await?;

    rollout.drive_until(2, TaskStatus::Done).await?;

    ensure!(rollout.migrator.cut_over_tables() == vec!["orders".to_owned()], "table swapped");
    ensure!(rollout.ghost_states.is_empty(), "slot released after cutover");
    ensure!(rollout.dump(DATABASE).await?.contains("ADD COLUMN note"), "change applied");
    let rows = rollout.history()?;
    let [row] = rows.as_slice() else {
        bail!("expected one ledger row, got {}", rows.len());
    };
    ensure!(row.migration_type == MigrationType::Migrate, "schema change row");
    ensure!(row.issue_id == Some(ISSUE), "issue recorded");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn canceling_the_issue_stops_a_running_sync() -> eyre::Result<()> {
    let rollout =
        Rollout::build_with(|migrator| migrator.with_step_interval(Duration::from_secs(60)))?;
    ghost_pipeline(&rollout).await?;
    rollout.drive_until(1, TaskStatus::Running).await?;
    let issue = rollout
        .store
        .issue(ISSUE)?
        .ok_or_else(|| eyre::eyre!("issue should exist"))?;

    let canceled = rollout
        .scheduler
        .change_issue_status(&issue, IssueStatus::Canceled, CREATOR, "abandoned")
        .await?;

    ensure!(canceled.status == IssueStatus::Canceled, "issue canceled");
    ensure!(rollout.status_of(1).await? == TaskStatus::Canceled, "sync canceled");
    ensure!(rollout.status_of(2).await? == TaskStatus::Canceled, "cutover canceled with it");
    for _ in 0..200 {
        if !rollout.migrator.aborted().is_empty() {
            ensure!(rollout.ghost_states.is_empty(), "nothing parked");
            ensure!(rollout.history()?.is_empty(), "ledger untouched");
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bail!("gh-ost was never aborted")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn canceling_the_issue_aborts_a_parked_migration() -> eyre::Result<()> {
    let rollout = Rollout::build()?;
    rollout
        .store
        .set_approval_policy(ENVIRONMENT, ApprovalPolicy::manual())?;
    ghost_pipeline(&rollout).await?;
    let sync = rollout
        .store
        .get_task(TaskId::new(1))
        .await?
        .ok_or_else(|| eyre::eyre!("sync task should exist"))?;
    rollout
        .scheduler
        .patch_task_status(
            &sync,
            TaskStatusPatch::single(sync.id(), TaskStatus::Pending, CREATOR),
        )
        .await?;
    rollout.drive_until(1, TaskStatus::Done).await?;
    ensure!(rollout.ghost_states.len() == 1, "sync parked the migration");
    ensure!(rollout.status_of(2).await? == TaskStatus::PendingApproval, "cutover waits");
    let issue = rollout
        .store
        .issue(ISSUE)?
        .ok_or_else(|| eyre::eyre!("issue should exist"))?;

    rollout
        .scheduler
        .change_issue_status(&issue, IssueStatus::Canceled, CREATOR, "abandoned")
        .await?;

    ensure!(rollout.ghost_states.is_empty(), "slot freed");
    ensure!(
        rollout.status_of(2).await? == TaskStatus::PendingApproval,
        "cutover left for a reopened issue"
    );
    for _ in 0..200 {
        let aborted = rollout.migrator.aborted();
        if !aborted.is_empty() {
            ensure!(aborted == vec!["cutover task canceled".to_owned()], "got {aborted:?}");
            ensure!(rollout.migrator.cut_over_tables().is_empty(), "table never swapped");
            ensure!(rollout.history()?.is_empty(), "ledger untouched");
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bail!("gh-ost was never aborted")
}
