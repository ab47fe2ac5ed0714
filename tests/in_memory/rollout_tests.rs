//! Pipelines driven end to end by the task and check schedulers.

use super::helpers::{CREATOR, DATABASE, ISSUE, Rollout};
use changeflow::migration::{domain::MigrationStatus, ports::BackupStorage};
use changeflow::task::{
    domain::{
        ActivityType, BackupPayload, ErrorCode, Issue, IssueStatus, MigrationPayload,
        PitrCutoverPayload, PitrRestorePayload, TaskPayload, TaskStatus,
    },
    ports::TaskStore,
};
use changeflow::taskrun::pitr_database_name;
use eyre::{bail, ensure};
use rstest::rstest;
use std::time::Duration;

fn schema_update(statement: &str) -> TaskPayload {
    TaskPayload::SchemaUpdate(MigrationPayload::new(statement, "20240101"))
}

fn backup(name: &str) -> TaskPayload {
    TaskPayload::DatabaseBackup(BackupPayload {
        backup_name: name.to_owned(),
    })
}

fn issue(rollout: &Rollout) -> eyre::Result<Issue> {
    rollout
        .store
        .issue(ISSUE)?
        .ok_or_else(|| eyre::eyre!("issue {ISSUE} should exist"))
}

/// Polls until the issue reaches `expected` or two seconds pass.
async fn wait_for_issue(rollout: &Rollout, expected: IssueStatus) -> eyre::Result<Issue> {
    for _ in 0..200 {
        let current = issue(rollout)?;
        if current.status == expected {
            return Ok(current);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bail!("issue never reached {expected}")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn checked_schema_change_and_backup_resolve_the_issue() -> eyre::Result<()> {
    let rollout = Rollout::build()?;
    let change = rollout.add_task(1, schema_update("CREATE TABLE orders (id INT)"), &[])?;
    rollout.add_task(2, backup("nightly"), &[1])?;
    let runs = rollout.scheduler.schedule_task_checks(&change, CREATOR).await?;
    ensure!(runs.len() == 4, "connect, ledger, syntax and advise checks: {runs:?}");

    rollout.drive_until(2, TaskStatus::Done).await?;

    let resolved = wait_for_issue(&rollout, IssueStatus::Done).await?;
    ensure!(!resolved.assignee_need_attention, "attention cleared");
    let rows = rollout.history()?;
    let [row] = rows.as_slice() else {
        bail!("expected one ledger row, got {}", rows.len());
    };
    ensure!(row.status == MigrationStatus::Done, "row finalized");
    ensure!(row.issue_id == Some(ISSUE), "issue recorded");
    ensure!(
        rollout.storage.get("nightly").await?.contains("CREATE TABLE orders"),
        "backup taken after the change"
    );
    let updates = rollout.activities.activities_of(ActivityType::TaskStatusUpdate)?;
    ensure!(updates.len() >= 6, "every transition recorded: {}", updates.len());
    let issue_updates = rollout.activities.activities_of(ActivityType::IssueStatusUpdate)?;
    ensure!(issue_updates.len() == 1, "issue resolution recorded once");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failing_statement_stops_the_pipeline() -> eyre::Result<()> {
    let rollout = Rollout::build()?;
    rollout.instance.fail_statements_containing("orders")?;
    let change = rollout.add_task(1, schema_update("CREATE TABLE orders (id INT)"), &[])?;
    rollout.add_task(2, backup("nightly"), &[1])?;
    rollout.scheduler.schedule_task_checks(&change, CREATOR).await?;

    rollout.drive_until(1, TaskStatus::Failed).await?;

    let records = rollout.store.run_records(change.id())?;
    ensure!(
        records
            .last()
            .is_some_and(|record| record.code == ErrorCode::DbExecutionError),
        "failure classified: {records:?}"
    );
    ensure!(rollout.status_of(2).await? != TaskStatus::Running, "dependent never started");
    ensure!(issue(&rollout)?.status == IssueStatus::Open, "issue stays open");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn issue_with_unfinished_tasks_cannot_be_resolved() -> eyre::Result<()> {
    let rollout = Rollout::build()?;
    rollout.add_task(1, backup("nightly"), &[])?;

    let result = rollout
        .scheduler
        .change_issue_status(&issue(&rollout)?, IssueStatus::Done, CREATOR, "ship it")
        .await;

    let Err(err) = result else {
        bail!("expected a conflict, got {result:?}");
    };
    ensure!(err.code() == ErrorCode::Conflict, "code: {:?}", err.code());
    ensure!(issue(&rollout)?.status == IssueStatus::Open, "issue untouched");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn in_place_restore_swaps_backup_into_place() -> eyre::Result<()> {
    let rollout = Rollout::build()?;
    rollout.seed(DATABASE, "CREATE TABLE orders (id INT)").await?;
    rollout.seed(DATABASE, "INSERT INTO orders VALUES (1)").await?;
    let staging = pitr_database_name(DATABASE, issue(&rollout)?.created_at.timestamp());
    rollout.add_task(1, backup("nightly"), &[])?;
    rollout.add_task(
        2,
        TaskPayload::PitrRestore(PitrRestorePayload {
            backup_name: Some("nightly".to_owned()),
            point_in_time: None,
            target_database: None,
        }),
        &[1],
    )?;
    rollout.add_task(
        3,
        TaskPayload::PitrCutover(PitrCutoverPayload {
            restored_database: staging.clone(),
        }),
        &[2],
    )?;

    rollout.drive_until(1, TaskStatus::Done).await?;
    rollout.seed(DATABASE, "INSERT INTO orders VALUES (2)").await?;
    rollout.drive_until(3, TaskStatus::Done).await?;

    let restored = rollout.dump(DATABASE).await?;
    ensure!(restored.contains("VALUES (1)"), "backed-up row restored");
    ensure!(!restored.contains("VALUES (2)"), "later row rolled back");
    ensure!(rollout.dump("app_del").await?.contains("VALUES (2)"), "old data kept aside");
    ensure!(!rollout.instance.databases()?.contains(&staging), "staging renamed");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn tasks_left_running_are_canceled_at_startup() -> eyre::Result<()> {
    let rollout = Rollout::build()?;
    let task = rollout.add_task(1, backup("nightly"), &[])?;
    rollout.store.batch_patch_task_status(&[task.id()], TaskStatus::Running, CREATOR).await?;

    let cleared = rollout.scheduler.clear_running_tasks().await?;

    ensure!(cleared == 1, "cleared {cleared}");
    ensure!(rollout.status_of(1).await? == TaskStatus::Canceled, "task canceled");
    Ok(())
}
