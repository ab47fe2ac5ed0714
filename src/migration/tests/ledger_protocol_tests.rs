//! Unit tests for the begin/execute/end ledger protocol.

use crate::migration::{
    adapters::memory::{InMemoryDriver, InMemoryInstance, InMemoryMigrationLedger},
    domain::{
        MigrationError, MigrationHistory, MigrationInfo, MigrationSource, MigrationStatus,
        MigrationType, MigrationVersion, PendingMigration,
    },
    ports::Driver,
    services::{MigrationExecution, MigrationRunError, MigrationService},
};
use crate::task::domain::{Engine, ErrorCode, IssueId};
use chrono::Utc;
use eyre::{bail, ensure};
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use std::sync::Arc;

const DATABASE: &str = "app";
const ISSUE: IssueId = IssueId::new(7);

struct LedgerHarness {
    instance: InMemoryInstance,
    driver: InMemoryDriver,
    service: MigrationService<DefaultClock>,
}

impl LedgerHarness {
    fn rows(&self) -> eyre::Result<Vec<MigrationHistory>> {
        Ok(self.instance.ledger().rows()?)
    }

    async fn run(
        &self,
        info: &MigrationInfo,
        statement: &str,
    ) -> Result<MigrationExecution, MigrationRunError> {
        self.service
            .execute_migration(&self.driver, info, statement)
            .await
    }
}

#[fixture]
fn harness() -> LedgerHarness {
    let instance = InMemoryInstance::new("primary", Engine::Postgres);
    if let Err(err) = instance.create_database(DATABASE) {
        panic!("creating the fixture database failed: {err}");
    }
    let driver = match InMemoryDriver::open(&instance, Some(DATABASE)) {
        Ok(driver) => driver,
        Err(err) => panic!("opening the fixture driver failed: {err}"),
    };
    LedgerHarness {
        instance,
        driver,
        service: MigrationService::new(Arc::new(DefaultClock)),
    }
}

fn info(version: &str) -> MigrationInfo {
    MigrationInfo::new(DATABASE, MigrationVersion::plain(version))
        .with_issue(Some(ISSUE))
        .with_creator("dba@example.com")
}

fn pending(
    version: &str,
    sequence: i64,
    migration_type: MigrationType,
) -> eyre::Result<PendingMigration> {
    Ok(PendingMigration {
        creator: "dba@example.com".to_owned(),
        created_at: Utc::now(),
        release_version: "test".to_owned(),
        namespace: DATABASE.to_owned(),
        sequence,
        source: MigrationSource::Ui,
        migration_type,
        version: MigrationVersion::plain(version).to_stored()?,
        description: String::new(),
        statement: String::new(),
        schema_prev: String::new(),
        issue_id: Some(ISSUE),
        payload: String::new(),
    })
}

fn code_of(result: Result<MigrationExecution, MigrationRunError>) -> eyre::Result<ErrorCode> {
    match result {
        Ok(execution) => bail!("expected a failure, got {execution:?}"),
        Err(err) => Ok(err.code()),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn migration_records_both_schema_images(harness: LedgerHarness) -> eyre::Result<()> {
    let execution = harness
        .run(&info("0001"), "CREATE TABLE t (id INT)")
        .await?;

    let rows = harness.rows()?;
    let [row] = rows.as_slice() else {
        bail!("expected one row, found {}", rows.len());
    };
    ensure!(row.id == execution.history_id, "history id");
    ensure!(row.status == MigrationStatus::Done, "status {}", row.status);
    ensure!(row.sequence == 1, "sequence {}", row.sequence);
    ensure!(row.schema_prev.is_empty(), "pre-image {:?}", row.schema_prev);
    ensure!(row.schema.contains("CREATE TABLE t"), "post-image {:?}", row.schema);
    ensure!(execution.updated_schema == row.schema, "returned schema");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reapplying_a_version_is_idempotent(harness: LedgerHarness) -> eyre::Result<()> {
    let statement = "CREATE TABLE t (id INT)";
    let first = harness.run(&info("0001"), statement).await?;
    let second = harness.run(&info("0001"), statement).await?;

    ensure!(!first.already_applied && second.already_applied, "second run short-circuits");
    ensure!(first.history_id == second.history_id, "same ledger row");
    let done = harness
        .rows()?
        .into_iter()
        .filter(|row| row.status == MigrationStatus::Done)
        .count();
    ensure!(done == 1, "expected one done row, found {done}");
    ensure!(harness.instance.executed()? == vec![statement.to_owned()], "applied once");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn version_applied_by_another_issue_fails(harness: LedgerHarness) -> eyre::Result<()> {
    harness.run(&info("0001"), "CREATE TABLE t (id INT)").await?;
    let other = info("0001").with_issue(Some(IssueId::new(8)));

    let code = code_of(harness.run(&other, "CREATE TABLE t (id INT)").await)?;
    ensure!(code == ErrorCode::MigrationFailed, "code {code}");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_statement_marks_row_failed(harness: LedgerHarness) -> eyre::Result<()> {
    harness.instance.fail_statements_containing("broken")?;

    let code = code_of(harness.run(&info("0001"), "ALTER TABLE broken").await)?;
    ensure!(code == ErrorCode::DbExecutionError, "code {code}");
    let statuses: Vec<_> = harness.rows()?.iter().map(|row| row.status).collect();
    ensure!(statuses == vec![MigrationStatus::Failed], "statuses {statuses:?}");

    let retry = code_of(harness.run(&info("0001"), "ALTER TABLE broken").await)?;
    ensure!(retry == ErrorCode::MigrationFailed, "retry code {retry}");
    Ok(())
}

#[rstest]
#[case::pending(MigrationStatus::Pending, ErrorCode::MigrationPending)]
#[case::failed(MigrationStatus::Failed, ErrorCode::MigrationFailed)]
#[tokio::test(flavor = "multi_thread")]
async fn unfinished_row_blocks_unless_forced(
    harness: LedgerHarness,
    #[case] status: MigrationStatus,
    #[case] expected: ErrorCode,
) -> eyre::Result<()> {
    let seeded = harness
        .instance
        .ledger()
        .seed(&pending("0001", 1, MigrationType::Migrate)?, status)?;

    let code = code_of(harness.run(&info("0001"), "CREATE TABLE t (id INT)").await)?;
    ensure!(code == expected, "code {code}");

    let forced = harness
        .run(&info("0001").with_force(true), "CREATE TABLE t (id INT)")
        .await?;
    ensure!(forced.history_id == seeded, "forced run reuses row {seeded}");
    let rows = harness.rows()?;
    ensure!(rows.len() == 1, "no new row");
    ensure!(
        rows.iter().all(|row| row.status == MigrationStatus::Done),
        "row finalized"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn older_version_is_out_of_order(harness: LedgerHarness) -> eyre::Result<()> {
    harness.run(&info("0002"), "CREATE TABLE a (id INT)").await?;

    let applied = match harness.run(&info("0001"), "CREATE TABLE b (id INT)").await {
        Err(MigrationRunError::Migration(MigrationError::OutOfOrder { applied, .. })) => applied,
        other => bail!("expected out-of-order, got {other:?}"),
    };
    ensure!(applied == "0000.0000.0000-0002", "applied {applied}");
    ensure!(harness.instance.executed()?.len() == 1, "older statement not applied");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn branch_row_resets_version_window(harness: LedgerHarness) -> eyre::Result<()> {
    harness.run(&info("0005"), "CREATE TABLE a (id INT)").await?;
    harness
        .instance
        .ledger()
        .seed(&pending("0001", 2, MigrationType::Branch)?, MigrationStatus::Done)?;

    let execution = harness.run(&info("0002"), "CREATE TABLE b (id INT)").await?;
    let rows = harness.rows()?;
    let newest = rows.last().map(|row| (row.id, row.sequence));
    ensure!(newest == Some((execution.history_id, 3)), "newest row {newest:?}");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn baseline_records_without_executing(harness: LedgerHarness) -> eyre::Result<()> {
    let baseline = info("0001").with_type(MigrationType::Baseline);
    harness.run(&baseline, "CREATE TABLE ignored (id INT)").await?;

    ensure!(harness.instance.executed()?.is_empty(), "baseline executes nothing");
    let rows = harness.rows()?;
    ensure!(
        rows.iter().all(|row| row.status == MigrationStatus::Done),
        "baseline row is done"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_database_skips_pre_image() -> eyre::Result<()> {
    let instance = InMemoryInstance::new("primary", Engine::Mysql);
    let driver = InMemoryDriver::open(&instance, Some("fresh"))?;
    let service = MigrationService::new(Arc::new(DefaultClock));
    let create = MigrationInfo::new("fresh", MigrationVersion::plain("0001")).creating_database();

    let execution = service
        .execute_migration(&driver, &create, "CREATE DATABASE fresh")
        .await?;
    ensure!(execution.updated_schema.is_empty(), "empty database");
    ensure!(instance.databases()? == vec!["fresh".to_owned()], "database created");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn dropped_database_records_empty_schema(harness: LedgerHarness) -> eyre::Result<()> {
    harness.run(&info("0001"), "CREATE TABLE t (id INT)").await?;

    let execution = harness.run(&info("0002"), "DROP DATABASE app").await?;
    ensure!(execution.updated_schema.is_empty(), "post-image is empty");
    let last = harness.rows()?.last().map(|row| row.status);
    ensure!(last == Some(MigrationStatus::Done), "drop recorded as done");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn latest_version_is_most_recent_row(harness: LedgerHarness) -> eyre::Result<()> {
    ensure!(
        harness
            .service
            .latest_schema_version(&harness.driver, DATABASE)
            .await?
            .is_none(),
        "empty ledger has no version"
    );
    harness.run(&info("0001"), "CREATE TABLE a (id INT)").await?;
    harness.run(&info("0002"), "CREATE TABLE b (id INT)").await?;

    let latest = harness
        .service
        .latest_schema_version(&harness.driver, DATABASE)
        .await?;
    ensure!(latest == Some(MigrationVersion::plain("0002")), "latest {latest:?}");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_ledger_table_needs_setup() -> eyre::Result<()> {
    let instance = InMemoryInstance::new("bare", Engine::Mysql)
        .with_ledger(InMemoryMigrationLedger::without_setup());
    let driver = InMemoryDriver::open(&instance, None)?;
    ensure!(driver.needs_setup_migration().await?, "ledger table is missing");
    Ok(())
}
