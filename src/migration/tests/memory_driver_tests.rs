//! Unit tests for the in-memory driver used by executor tests.

use crate::migration::{
    adapters::memory::{InMemoryDriver, InMemoryDriverFactory, InMemoryInstance},
    ports::{Driver, DriverError, DriverFactory},
};
use crate::task::domain::{Engine, EnvironmentId, InstanceId, InstanceRef};
use eyre::{bail, ensure};
use rstest::rstest;

fn instance_ref(id: i64) -> InstanceRef {
    InstanceRef {
        id: InstanceId::new(id),
        name: format!("instance-{id}"),
        environment_id: EnvironmentId::new(1),
        engine: Engine::Postgres,
        archived: false,
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn full_dump_restores_schema_and_rows() -> eyre::Result<()> {
    let instance = InMemoryInstance::new("primary", Engine::Postgres);
    instance.create_database("app")?;
    let driver = InMemoryDriver::open(&instance, Some("app"))?;
    driver
        .execute("CREATE TABLE t (id INT); INSERT INTO t VALUES (1)", false)
        .await?;

    let schema = driver.dump("app", true).await?;
    let full = driver.dump("app", false).await?;
    ensure!(!schema.contains("INSERT"), "schema dump has no rows");
    ensure!(full.contains("INSERT INTO t"), "full dump has rows");

    driver.restore("copy", &full).await?;
    ensure!(driver.dump("copy", false).await? == full, "restore round-trips");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn swap_moves_previous_database_aside() -> eyre::Result<()> {
    let instance = InMemoryInstance::new("primary", Engine::Postgres);
    instance.create_database("app")?;
    instance.create_database("app_pitr")?;
    let driver = InMemoryDriver::open(&instance, None)?;

    driver.swap_database("app_pitr", "app").await?;
    ensure!(
        instance.databases()? == vec!["app".to_owned(), "app_del".to_owned()],
        "databases after swap: {:?}",
        instance.databases()?
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn injected_swap_failures_are_consumed() -> eyre::Result<()> {
    let instance = InMemoryInstance::new("primary", Engine::Postgres);
    instance.create_database("app_pitr")?;
    instance.fail_next_swaps(1)?;
    let driver = InMemoryDriver::open(&instance, None)?;

    ensure!(driver.swap_database("app_pitr", "app").await.is_err(), "first swap fails");
    driver.swap_database("app_pitr", "app").await?;
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn factory_tracks_open_drivers() -> eyre::Result<()> {
    let factory = InMemoryDriverFactory::new();
    let instance = InMemoryInstance::new("primary", Engine::Postgres);
    factory.register(InstanceId::new(1), instance.clone())?;

    let driver = factory.open(&instance_ref(1), Some("app")).await?;
    ensure!(instance.open_drivers()? == 1, "one open driver");
    driver.close().await;
    ensure!(instance.open_drivers()? == 0, "driver closed");

    match factory.open(&instance_ref(2), None).await {
        Err(DriverError::Connection { .. }) => Ok(()),
        Err(other) => bail!("unexpected error {other}"),
        Ok(_) => bail!("unregistered instance opened"),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unreachable_instance_refuses_connections() -> eyre::Result<()> {
    let instance = InMemoryInstance::new("primary", Engine::Mysql);
    let driver = InMemoryDriver::open(&instance, None)?;
    instance.set_unreachable(true)?;

    let Err(err) = driver.ping().await else {
        bail!("ping succeeded on an unreachable instance");
    };
    ensure!(err.code().as_i32() == 101, "connection failure code");
    ensure!(InMemoryDriver::open(&instance, None).is_err(), "new connections refused");
    Ok(())
}
