//! In-memory database instances and the drivers that open them.
//!
//! Statements are recorded rather than interpreted. `CREATE DATABASE` and
//! `DROP DATABASE` change the database set, data statements (`INSERT`,
//! `UPDATE`, `DELETE`) are kept as rows, and everything else becomes part of
//! the schema dump. Every recorded statement is also appended to the
//! database's change log with its time, which point-in-time recovery
//! replays.

use super::InMemoryMigrationLedger;
use crate::migration::ports::{Driver, DriverError, DriverFactory, DriverResult, MigrationLedger};
use crate::task::domain::{Engine, InstanceId, InstanceRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

const STATEMENT_SEPARATOR: &str = ";\n";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct InMemoryDatabase {
    schema: Vec<String>,
    rows: Vec<String>,
    change_log: Vec<(DateTime<Utc>, String)>,
}

impl InMemoryDatabase {
    fn record(&mut self, statement: &str) {
        self.record_at(Utc::now(), statement);
    }

    fn record_at(&mut self, at: DateTime<Utc>, statement: &str) {
        self.change_log.push((at, statement.to_owned()));
        if is_data_statement(statement) {
            self.rows.push(statement.to_owned());
        } else {
            self.schema.push(statement.to_owned());
        }
    }

    fn dump(&self, schema_only: bool) -> String {
        let mut dumped = String::new();
        let rows: &[String] = if schema_only { &[] } else { &self.rows };
        for statement in self.schema.iter().chain(rows) {
            dumped.push_str(statement);
            dumped.push_str(STATEMENT_SEPARATOR);
        }
        dumped
    }
}

#[derive(Debug, Default)]
struct InstanceState {
    databases: BTreeMap<String, InMemoryDatabase>,
    executed: Vec<String>,
    failing_patterns: Vec<String>,
    unreachable: bool,
    swap_failures: u32,
    open_drivers: usize,
}

/// One simulated database instance with its own ledger.
#[derive(Debug, Clone)]
pub struct InMemoryInstance {
    name: String,
    engine: Engine,
    state: Arc<RwLock<InstanceState>>,
    ledger: InMemoryMigrationLedger,
}

fn lock_error(err: impl ToString) -> DriverError {
    DriverError::persistence(std::io::Error::other(err.to_string()))
}

impl InMemoryInstance {
    /// Creates an empty reachable instance.
    pub fn new(name: impl Into<String>, engine: Engine) -> Self {
        Self {
            name: name.into(),
            engine,
            state: Arc::new(RwLock::new(InstanceState::default())),
            ledger: InMemoryMigrationLedger::new(),
        }
    }

    /// Replaces the instance's ledger.
    #[must_use]
    pub fn with_ledger(mut self, ledger: InMemoryMigrationLedger) -> Self {
        self.ledger = ledger;
        self
    }

    fn read(&self) -> DriverResult<RwLockReadGuard<'_, InstanceState>> {
        self.state.read().map_err(lock_error)
    }

    fn write(&self) -> DriverResult<RwLockWriteGuard<'_, InstanceState>> {
        self.state.write().map_err(lock_error)
    }

    /// Returns the instance's ledger.
    #[must_use]
    pub const fn ledger(&self) -> &InMemoryMigrationLedger {
        &self.ledger
    }

    /// Creates an empty database.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Persistence`] when the lock is poisoned.
    pub fn create_database(&self, name: &str) -> DriverResult<()> {
        self.write()?
            .databases
            .insert(name.to_owned(), InMemoryDatabase::default());
        Ok(())
    }

    /// Returns the names of every database.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Persistence`] when the lock is poisoned.
    pub fn databases(&self) -> DriverResult<Vec<String>> {
        Ok(self.read()?.databases.keys().cloned().collect())
    }

    /// Returns every statement executed so far, in order.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Persistence`] when the lock is poisoned.
    pub fn executed(&self) -> DriverResult<Vec<String>> {
        Ok(self.read()?.executed.clone())
    }

    /// Returns the number of drivers opened and not yet closed.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Persistence`] when the lock is poisoned.
    pub fn open_drivers(&self) -> DriverResult<usize> {
        Ok(self.read()?.open_drivers)
    }

    /// Makes every statement containing `pattern` fail.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Persistence`] when the lock is poisoned.
    pub fn fail_statements_containing(&self, pattern: &str) -> DriverResult<()> {
        self.write()?.failing_patterns.push(pattern.to_owned());
        Ok(())
    }

    /// Makes the instance unreachable or reachable again.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Persistence`] when the lock is poisoned.
    pub fn set_unreachable(&self, unreachable: bool) -> DriverResult<()> {
        self.write()?.unreachable = unreachable;
        Ok(())
    }

    /// Makes the next `failures` database swaps fail.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Persistence`] when the lock is poisoned.
    pub fn fail_next_swaps(&self, failures: u32) -> DriverResult<()> {
        self.write()?.swap_failures = failures;
        Ok(())
    }

    fn connect(&self) -> DriverResult<()> {
        let mut state = self.write()?;
        if state.unreachable {
            return Err(self.connection_refused());
        }
        state.open_drivers += 1;
        Ok(())
    }

    fn connection_refused(&self) -> DriverError {
        DriverError::Connection {
            instance: self.name.clone(),
            message: "connection refused".to_owned(),
        }
    }
}

/// Driver over an [`InMemoryInstance`].
#[derive(Debug)]
pub struct InMemoryDriver {
    instance: InMemoryInstance,
    database: Option<String>,
}

impl InMemoryDriver {
    /// Opens a driver on `instance`, bound to `database` when given.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Connection`] when the instance is unreachable.
    pub fn open(instance: &InMemoryInstance, database: Option<&str>) -> DriverResult<Self> {
        instance.connect()?;
        Ok(Self {
            instance: instance.clone(),
            database: database.map(str::to_owned),
        })
    }

    fn reachable_state(&self) -> DriverResult<RwLockWriteGuard<'_, InstanceState>> {
        let state = self.instance.write()?;
        if state.unreachable {
            return Err(self.instance.connection_refused());
        }
        Ok(state)
    }

    fn apply(&self, state: &mut InstanceState, statement: &str) -> DriverResult<()> {
        let upper = statement.to_ascii_uppercase();
        if upper.starts_with("CREATE DATABASE ") {
            let name = object_name(statement);
            if state.databases.contains_key(&name) {
                return Err(execution_error(statement, "database already exists"));
            }
            state.databases.insert(name, InMemoryDatabase::default());
            return Ok(());
        }
        if upper.starts_with("DROP DATABASE ") {
            let name = object_name(statement);
            return state
                .databases
                .remove(&name)
                .map(|_| ())
                .ok_or_else(|| execution_error(statement, "database does not exist"));
        }
        let target = self
            .database
            .as_deref()
            .ok_or_else(|| execution_error(statement, "no database selected"))?;
        state
            .databases
            .get_mut(target)
            .ok_or_else(|| DriverError::DatabaseNotFound(target.to_owned()))?
            .record(statement);
        Ok(())
    }
}

fn is_data_statement(statement: &str) -> bool {
    let upper = statement.trim_start().to_ascii_uppercase();
    ["INSERT ", "UPDATE ", "DELETE "]
        .iter()
        .any(|keyword| upper.starts_with(keyword))
}

fn object_name(statement: &str) -> String {
    statement
        .split_whitespace()
        .nth(2)
        .unwrap_or_default()
        .trim_matches(|c| matches!(c, '`' | '"' | ';'))
        .to_owned()
}

fn execution_error(statement: &str, message: &str) -> DriverError {
    DriverError::Execution {
        statement: statement.to_owned(),
        message: message.to_owned(),
    }
}

fn split_statements(statement: &str) -> impl Iterator<Item = &str> {
    statement
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
}

#[async_trait]
impl Driver for InMemoryDriver {
    fn engine(&self) -> Engine {
        self.instance.engine
    }

    async fn ping(&self) -> DriverResult<()> {
        self.reachable_state().map(|_| ())
    }

    async fn execute(&self, statement: &str, _create_database: bool) -> DriverResult<u64> {
        let mut state = self.reachable_state()?;
        if state
            .failing_patterns
            .iter()
            .any(|pattern| statement.contains(pattern.as_str()))
        {
            return Err(execution_error(statement, "statement rejected"));
        }
        state.executed.push(statement.to_owned());
        let mut affected = 0_u64;
        for part in split_statements(statement) {
            self.apply(&mut state, part)?;
            affected += 1;
        }
        Ok(affected)
    }

    async fn dump(&self, database: &str, schema_only: bool) -> DriverResult<String> {
        let state = self.reachable_state()?;
        state
            .databases
            .get(database)
            .map(|found| found.dump(schema_only))
            .ok_or_else(|| DriverError::DatabaseNotFound(database.to_owned()))
    }

    async fn restore(&self, database: &str, backup: &str) -> DriverResult<()> {
        let mut state = self.reachable_state()?;
        let mut restored = InMemoryDatabase::default();
        for statement in split_statements(backup) {
            restored.record(statement);
        }
        state.databases.insert(database.to_owned(), restored);
        Ok(())
    }

    async fn replay_to_point_in_time(
        &self,
        source: &str,
        target: &str,
        at: DateTime<Utc>,
    ) -> DriverResult<()> {
        if !self.instance.engine.supports_point_in_time_recovery() {
            return Err(DriverError::NotSupported {
                engine: self.instance.engine,
                operation: "point-in-time recovery",
            });
        }
        let mut state = self.reachable_state()?;
        let mut rebuilt = InMemoryDatabase::default();
        for (recorded_at, statement) in &state
            .databases
            .get(source)
            .ok_or_else(|| DriverError::DatabaseNotFound(source.to_owned()))?
            .change_log
        {
            if *recorded_at <= at {
                rebuilt.record_at(*recorded_at, statement);
            }
        }
        state.databases.insert(target.to_owned(), rebuilt);
        Ok(())
    }

    async fn swap_database(&self, restored: &str, target: &str) -> DriverResult<()> {
        let mut state = self.reachable_state()?;
        if state.swap_failures > 0 {
            state.swap_failures -= 1;
            return Err(execution_error(
                &format!("RENAME DATABASE {restored} TO {target}"),
                "database is being accessed by other users",
            ));
        }
        let incoming = state
            .databases
            .remove(restored)
            .ok_or_else(|| DriverError::DatabaseNotFound(restored.to_owned()))?;
        if let Some(previous) = state.databases.remove(target) {
            state.databases.insert(format!("{target}_del"), previous);
        }
        state.databases.insert(target.to_owned(), incoming);
        Ok(())
    }

    fn ledger(&self) -> Arc<dyn MigrationLedger> {
        Arc::new(self.instance.ledger.clone())
    }

    async fn close(&self) {
        if let Ok(mut state) = self.instance.write() {
            state.open_drivers = state.open_drivers.saturating_sub(1);
        }
    }
}

/// Opens [`InMemoryDriver`]s for registered instances.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDriverFactory {
    instances: Arc<RwLock<HashMap<InstanceId, InMemoryInstance>>>,
}

impl InMemoryDriverFactory {
    /// Creates a factory with no instances.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `instance` under `instance_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Persistence`] when the lock is poisoned.
    pub fn register(
        &self,
        instance_id: InstanceId,
        instance: InMemoryInstance,
    ) -> DriverResult<()> {
        self.instances
            .write()
            .map_err(lock_error)?
            .insert(instance_id, instance);
        Ok(())
    }
}

#[async_trait]
impl DriverFactory for InMemoryDriverFactory {
    async fn open(
        &self,
        instance: &InstanceRef,
        database: Option<&str>,
    ) -> DriverResult<Box<dyn Driver>> {
        let registered = self
            .instances
            .read()
            .map_err(lock_error)?
            .get(&instance.id)
            .cloned()
            .ok_or_else(|| DriverError::Connection {
                instance: instance.name.clone(),
                message: "instance is not registered".to_owned(),
            })?;
        Ok(Box::new(InMemoryDriver::open(&registered, database)?))
    }
}
