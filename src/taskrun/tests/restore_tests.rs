//! Tests for the backup, restore and restore cutover executors.

use super::fixtures::{DATABASE, Harness, failure, finished, issue_created_at};
use crate::config::CutoverPolicy;
use crate::migration::{
    domain::{MigrationStatus, MigrationType},
    ports::BackupStorage,
};
use crate::task::{
    adapters::memory::InMemoryTaskStore,
    domain::{
        BackupPayload, Engine, ErrorCode, PitrCutoverPayload, PitrRestorePayload, TaskPayload,
    },
    ports::TaskExecutor,
};
use crate::taskrun::{
    BackupExecutor, PitrCutoverExecutor, PitrRestoreExecutor, pitr_database_name,
};
use chrono::{DateTime, Utc};
use eyre::ensure;
use mockable::DefaultClock;
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn backup_executor(harness: &Harness) -> BackupExecutor {
    BackupExecutor::new(Arc::clone(&harness.drivers), harness.storage.clone())
}

fn restore_executor(harness: &Harness) -> PitrRestoreExecutor<InMemoryTaskStore, DefaultClock> {
    PitrRestoreExecutor::new(
        Arc::clone(&harness.store),
        Arc::clone(&harness.drivers),
        harness.storage.clone(),
        Arc::new(DefaultClock),
        &harness.config,
    )
}

fn restore(
    backup_name: Option<&str>,
    point_in_time: Option<DateTime<Utc>>,
    target_database: Option<&str>,
) -> TaskPayload {
    TaskPayload::PitrRestore(PitrRestorePayload {
        backup_name: backup_name.map(str::to_owned),
        point_in_time,
        target_database: target_database.map(str::to_owned),
    })
}

fn cutover(restored_database: &str) -> TaskPayload {
    TaskPayload::PitrCutover(PitrCutoverPayload {
        restored_database: restored_database.to_owned(),
    })
}

/// Seeds `app` with a table and a row, then backs it up as `nightly`.
async fn backed_up(engine: Engine) -> eyre::Result<Harness> {
    let harness = Harness::build(engine)?;
    harness.seed(DATABASE, "CREATE TABLE orders (id INT)").await?;
    harness.seed(DATABASE, "INSERT INTO orders VALUES (1)").await?;
    let task = harness.task(
        1,
        TaskPayload::DatabaseBackup(BackupPayload {
            backup_name: "nightly".to_owned(),
        }),
    )?;
    finished(backup_executor(&harness).run_once(&CancellationToken::new(), &task).await)?;
    Ok(harness)
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn backup_stores_schema_and_rows() -> eyre::Result<()> {
    let harness = backed_up(Engine::Mysql).await?;

    let stored = harness.storage.get("nightly").await?;

    ensure!(stored.contains("CREATE TABLE orders"), "schema stored");
    ensure!(stored.contains("INSERT INTO orders"), "rows stored");
    ensure!(harness.instance.open_drivers()? == 0, "driver closed");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn restore_into_new_database_records_branch_row() -> eyre::Result<()> {
    let harness = backed_up(Engine::Mysql).await?;
    let task = harness.task(2, restore(Some("nightly"), None, Some("app_copy")))?;

    let result =
        finished(restore_executor(&harness).run_once(&CancellationToken::new(), &task).await)?;

    ensure!(
        result.detail == r#"Restored database "app_copy" from backup "nightly""#,
        "detail: {}",
        result.detail
    );
    ensure!(harness.dump("app_copy").await? == harness.dump(DATABASE).await?, "same data");
    let rows = harness.history()?;
    let [row] = rows.as_slice() else {
        eyre::bail!("expected one ledger row, got {}", rows.len());
    };
    ensure!(row.migration_type == MigrationType::Branch, "branch row");
    ensure!(row.status == MigrationStatus::Done, "row finalized");
    ensure!(row.namespace == "app_copy", "namespace is the target");
    ensure!(
        row.description == r#"Restored from backup "nightly" of database "app"."#,
        "description: {}",
        row.description
    );
    ensure!(result.migration_id == Some(row.id), "result links the row");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn in_place_restore_uses_staging_database() -> eyre::Result<()> {
    let harness = backed_up(Engine::Postgres).await?;
    let task = harness.task(2, restore(Some("nightly"), None, None))?;

    let result =
        finished(restore_executor(&harness).run_once(&CancellationToken::new(), &task).await)?;

    let staging = pitr_database_name(DATABASE, issue_created_at()?.timestamp());
    ensure!(staging == "app_pitr_1700000000", "staging name: {staging}");
    ensure!(harness.instance.databases()?.contains(&staging), "staging created");
    ensure!(result.detail.contains("temporary PITR database"), "detail: {}", result.detail);
    ensure!(harness.history()?.is_empty(), "no ledger row for staging");
    Ok(())
}

#[rstest]
#[case::both(Some("nightly"), true)]
#[case::neither(None, false)]
#[tokio::test(flavor = "multi_thread")]
async fn restore_needs_exactly_one_source(
    #[case] backup_name: Option<&str>,
    #[case] with_time: bool,
) -> eyre::Result<()> {
    let harness = Harness::build(Engine::Mysql)?;
    let point_in_time = with_time.then(Utc::now);
    let task = harness.task(2, restore(backup_name, point_in_time, Some("app_copy")))?;

    let (code, message) =
        failure(restore_executor(&harness).run_once(&CancellationToken::new(), &task).await)?;

    ensure!(code == ErrorCode::Invalid, "code: {code:?}");
    ensure!(
        message == "only one of backup name and point in time can be set",
        "message: {message}"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_backup_is_not_found() -> eyre::Result<()> {
    let harness = Harness::build(Engine::Mysql)?;
    let task = harness.task(2, restore(Some("absent"), None, Some("app_copy")))?;

    let (code, _) =
        failure(restore_executor(&harness).run_once(&CancellationToken::new(), &task).await)?;

    ensure!(code == ErrorCode::NotFound, "code: {code:?}");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn point_in_time_restore_replays_up_to_cutoff() -> eyre::Result<()> {
    let harness = Harness::build(Engine::Mysql)?;
    harness.seed(DATABASE, "CREATE TABLE orders (id INT)").await?;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let cutoff = Utc::now();
    tokio::time::sleep(Duration::from_millis(5)).await;
    harness.seed(DATABASE, "INSERT INTO orders VALUES (1)").await?;
    let task = harness.task(2, restore(None, Some(cutoff), Some("app_before")))?;

    let result =
        finished(restore_executor(&harness).run_once(&CancellationToken::new(), &task).await)?;

    let restored = harness.dump("app_before").await?;
    ensure!(restored.contains("CREATE TABLE orders"), "schema replayed");
    ensure!(!restored.contains("INSERT INTO orders"), "later rows skipped");
    ensure!(
        result.detail == r#"PITR restore success for target database "app_before""#,
        "detail: {}",
        result.detail
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn point_in_time_restore_needs_engine_support() -> eyre::Result<()> {
    let harness = Harness::build(Engine::Postgres)?;
    let task = harness.task(2, restore(None, Some(Utc::now()), None))?;

    let (code, _) =
        failure(restore_executor(&harness).run_once(&CancellationToken::new(), &task).await)?;

    ensure!(code == ErrorCode::NotImplemented, "code: {code:?}");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cutover_swaps_restored_database_into_place() -> eyre::Result<()> {
    let harness = Harness::build(Engine::Mysql)?;
    harness.instance.create_database("app_pitr_1")?;
    harness.seed("app_pitr_1", "CREATE TABLE restored (id INT)").await?;
    let task = harness.task(3, cutover("app_pitr_1"))?;
    let executor = PitrCutoverExecutor::new(Arc::clone(&harness.drivers), &harness.config);

    finished(executor.run_once(&CancellationToken::new(), &task).await)?;

    let databases = harness.instance.databases()?;
    ensure!(databases.contains(&"app_del".to_owned()), "old data kept aside");
    ensure!(!databases.contains(&"app_pitr_1".to_owned()), "staging renamed");
    ensure!(harness.dump(DATABASE).await?.contains("restored"), "restored data in place");
    Ok(())
}

#[rstest]
#[case::postgres_retries(Engine::Postgres, 2, true)]
#[case::mysql_single_attempt(Engine::Mysql, 1, false)]
#[tokio::test(flavor = "multi_thread")]
async fn cutover_follows_engine_policy(
    #[case] engine: Engine,
    #[case] failing_swaps: u32,
    #[case] succeeds: bool,
) -> eyre::Result<()> {
    let harness = Harness::build(engine)?;
    harness.instance.create_database("app_pitr_1")?;
    harness.instance.fail_next_swaps(failing_swaps)?;
    let task = harness.task(3, cutover("app_pitr_1"))?;
    let executor = PitrCutoverExecutor::new(Arc::clone(&harness.drivers), &harness.config);

    let outcome = executor.run_once(&CancellationToken::new(), &task).await;

    if succeeds {
        finished(outcome)?;
    } else {
        let (code, _) = failure(outcome)?;
        ensure!(code == ErrorCode::DbExecutionError, "code: {code:?}");
    }
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancel_interrupts_cutover_backoff() -> eyre::Result<()> {
    let mut harness = Harness::build(Engine::Postgres)?;
    harness.config.cutover_policies.postgres = CutoverPolicy::retrying(3, 60_000);
    harness.instance.create_database("app_pitr_1")?;
    harness.instance.fail_next_swaps(1)?;
    let task = harness.task(3, cutover("app_pitr_1"))?;
    let executor = PitrCutoverExecutor::new(Arc::clone(&harness.drivers), &harness.config);
    let token = CancellationToken::new();
    token.cancel();

    let (_, message) = failure(executor.run_once(&token, &task).await)?;

    ensure!(message == "task execution canceled", "message: {message}");
    ensure!(harness.instance.open_drivers()? == 0, "driver closed");
    Ok(())
}
