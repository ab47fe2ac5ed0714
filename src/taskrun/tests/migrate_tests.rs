//! Tests for the statement executor.

use super::fixtures::{DATABASE, Harness, ISSUE, failure, finished};
use crate::migration::domain::{MigrationSource, MigrationStatus, MigrationType};
use crate::task::{
    adapters::memory::InMemoryTaskStore,
    domain::{
        BackupPayload, DatabaseCreatePayload, Engine, ErrorCode, MigrationPayload, TaskPayload,
    },
    ports::{ExecutionOutcome, TaskExecutor},
};
use crate::taskrun::MigrateExecutor;
use eyre::ensure;
use mockable::DefaultClock;
use rstest::rstest;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn executor(harness: &Harness) -> MigrateExecutor<InMemoryTaskStore, DefaultClock> {
    MigrateExecutor::new(
        Arc::clone(&harness.store),
        Arc::clone(&harness.drivers),
        Arc::new(DefaultClock),
        &harness.config,
    )
}

fn schema_update(statement: &str, version: &str) -> TaskPayload {
    TaskPayload::SchemaUpdate(MigrationPayload::new(statement, version))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn schema_update_records_issue_metadata() -> eyre::Result<()> {
    let harness = Harness::build(Engine::Mysql)?;
    let task = harness.task(1, schema_update("CREATE TABLE orders (id INT)", "20240101"))?;

    let result = finished(executor(&harness).run_once(&CancellationToken::new(), &task).await)?;

    let rows = harness.history()?;
    let [row] = rows.as_slice() else {
        eyre::bail!("expected one ledger row, got {}", rows.len());
    };
    ensure!(row.status == MigrationStatus::Done, "row finalized");
    ensure!(row.migration_type == MigrationType::Migrate, "schema change type");
    ensure!(row.source == MigrationSource::Vcs, "source follows the issue workflow");
    ensure!(row.issue_id == Some(ISSUE), "issue recorded");
    ensure!(row.created_by == "Ada", "creator is the principal name");
    ensure!(row.description == "Add orders table", "description is the issue name");
    ensure!(row.schema_prev.is_empty(), "empty database before");
    ensure!(row.schema.contains("CREATE TABLE orders"), "post-image recorded");
    ensure!(result.migration_id == Some(row.id), "result links the row");
    ensure!(
        result.version.as_deref() == Some("0000.0000.0000-20240101"),
        "stored version reported"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn rerun_of_applied_version_is_a_no_op() -> eyre::Result<()> {
    let harness = Harness::build(Engine::Mysql)?;
    let task = harness.task(1, schema_update("CREATE TABLE orders (id INT)", "20240101"))?;
    let executor = executor(&harness);

    let first = finished(executor.run_once(&CancellationToken::new(), &task).await)?;
    let second = finished(executor.run_once(&CancellationToken::new(), &task).await)?;

    ensure!(second.migration_id == first.migration_id, "same ledger row");
    ensure!(second.detail.starts_with("Skipped"), "detail: {}", second.detail);
    ensure!(harness.history()?.len() == 1, "no second row");
    ensure!(harness.instance.executed()?.len() == 1, "statement ran once");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn data_update_records_data_row() -> eyre::Result<()> {
    let harness = Harness::build(Engine::Postgres)?;
    harness.seed(DATABASE, "CREATE TABLE orders (id INT)").await?;
    let task = harness.task(
        1,
        TaskPayload::DataUpdate(MigrationPayload::new("INSERT INTO orders VALUES (1)", "7")),
    )?;

    finished(executor(&harness).run_once(&CancellationToken::new(), &task).await)?;

    let rows = harness.history()?;
    ensure!(
        rows.iter().any(|row| row.migration_type == MigrationType::Data),
        "data row recorded"
    );
    ensure!(harness.dump(DATABASE).await?.contains("INSERT INTO orders"), "row inserted");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn database_create_skips_the_pre_image() -> eyre::Result<()> {
    let harness = Harness::build(Engine::Mysql)?;
    let task = harness.task(
        1,
        TaskPayload::DatabaseCreate(DatabaseCreatePayload {
            database_name: "billing".to_owned(),
            statement: "CREATE DATABASE billing".to_owned(),
            schema_version: String::new(),
        }),
    )?;

    let result = finished(executor(&harness).run_once(&CancellationToken::new(), &task).await)?;

    ensure!(harness.instance.databases()?.contains(&"billing".to_owned()), "created");
    let rows = harness.history()?;
    let [row] = rows.as_slice() else {
        eyre::bail!("expected one ledger row, got {}", rows.len());
    };
    ensure!(row.namespace == "billing", "namespace is the new database");
    ensure!(row.schema_prev.is_empty(), "no pre-image");
    ensure!(
        result
            .version
            .as_deref()
            .is_some_and(|version| version.len() == "0000.0000.0000-".len() + 14),
        "empty version falls back to a timestamp"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn semantic_version_is_stored_padded() -> eyre::Result<()> {
    let harness = Harness::build(Engine::Mysql)?;
    let mut payload = MigrationPayload::new("CREATE TABLE orders (id INT)", "1.2.3");
    payload.use_semantic_version = true;
    payload.semantic_version_suffix = "20240101".to_owned();
    let task = harness.task(1, TaskPayload::SchemaUpdate(payload))?;

    let result = finished(executor(&harness).run_once(&CancellationToken::new(), &task).await)?;

    ensure!(
        result.version.as_deref() == Some("0001.0002.0003-20240101"),
        "stored version: {:?}",
        result.version
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_statement_fails_the_row() -> eyre::Result<()> {
    let harness = Harness::build(Engine::Mysql)?;
    harness.instance.fail_statements_containing("DROP")?;
    let task = harness.task(1, schema_update("DROP TABLE orders", "20240101"))?;

    let (code, _) = failure(executor(&harness).run_once(&CancellationToken::new(), &task).await)?;

    ensure!(code == ErrorCode::DbExecutionError, "code: {code:?}");
    let rows = harness.history()?;
    ensure!(
        rows.iter().all(|row| row.status == MigrationStatus::Failed),
        "row marked failed"
    );
    ensure!(harness.instance.open_drivers()? == 0, "driver closed");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unreachable_instance_is_retried() -> eyre::Result<()> {
    let harness = Harness::build(Engine::Mysql)?;
    harness.instance.set_unreachable(true)?;
    let task = harness.task(1, schema_update("CREATE TABLE orders (id INT)", "20240101"))?;

    let outcome = executor(&harness).run_once(&CancellationToken::new(), &task).await;

    let ExecutionOutcome::Retry(err) = &outcome else {
        eyre::bail!("expected a retry, got {outcome:?}");
    };
    ensure!(err.code == ErrorCode::DbConnectionFailure, "code: {:?}", err.code);
    ensure!(harness.history()?.is_empty(), "nothing recorded");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn non_statement_task_is_invalid() -> eyre::Result<()> {
    let harness = Harness::build(Engine::Mysql)?;
    let task = harness.task(
        1,
        TaskPayload::DatabaseBackup(BackupPayload {
            backup_name: "nightly".to_owned(),
        }),
    )?;

    let (code, _) = failure(executor(&harness).run_once(&CancellationToken::new(), &task).await)?;

    ensure!(code == ErrorCode::Invalid, "code: {code:?}");
    Ok(())
}
