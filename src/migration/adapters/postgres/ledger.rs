//! `PostgreSQL` migration ledger.

use super::{
    models::{CountRow, MigrationHistoryRow, NewMigrationHistoryRow},
    schema::migration_history,
};
use crate::migration::{
    domain::{
        MigrationHistory, MigrationHistoryFind, MigrationSource, MigrationStatus, MigrationType,
        PendingMigration,
    },
    ports::{LedgerError, LedgerResult, MigrationLedger},
};
use crate::task::domain::IssueId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::max;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};

/// `PostgreSQL` connection pool type used by the ledger.
pub type LedgerPgPool = Pool<ConnectionManager<PgConnection>>;

const BASELINE_TYPES: [&str; 2] = [
    MigrationType::Baseline.as_str(),
    MigrationType::Branch.as_str(),
];

/// `PostgreSQL`-backed migration ledger.
#[derive(Debug, Clone)]
pub struct PostgresMigrationLedger {
    pool: LedgerPgPool,
}

impl PostgresMigrationLedger {
    /// Creates a ledger from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: LedgerPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> LedgerResult<T>
    where
        F: FnOnce(&mut PgConnection) -> LedgerResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(LedgerError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(LedgerError::persistence)?
    }
}

#[async_trait]
impl MigrationLedger for PostgresMigrationLedger {
    async fn needs_setup(&self) -> LedgerResult<bool> {
        self.run_blocking(|connection| {
            let found = diesel::sql_query(concat!(
                "SELECT COUNT(*) AS count FROM information_schema.tables ",
                "WHERE table_name = 'migration_history'",
            ))
            .get_result::<CountRow>(connection)
            .map_err(LedgerError::persistence)?;
            Ok(found.count == 0)
        })
        .await
    }

    async fn find_migration_history_list(
        &self,
        find: &MigrationHistoryFind,
    ) -> LedgerResult<Vec<MigrationHistory>> {
        let filter = find.clone();
        self.run_blocking(move |connection| {
            let mut query = migration_history::table.into_boxed();
            if let Some(id) = filter.id {
                query = query.filter(migration_history::id.eq(id));
            }
            if let Some(namespace) = filter.namespace {
                query = query.filter(migration_history::namespace.eq(namespace));
            }
            if let Some(source) = filter.source {
                query = query.filter(migration_history::source.eq(source.as_str()));
            }
            if let Some(version) = filter.version {
                query = query.filter(migration_history::version.eq(version));
            }
            if let Some(limit) = filter.limit {
                query = query.limit(i64::try_from(limit).map_err(LedgerError::persistence)?);
            }
            query
                .order(migration_history::id.desc())
                .select(MigrationHistoryRow::as_select())
                .load::<MigrationHistoryRow>(connection)
                .map_err(LedgerError::persistence)?
                .into_iter()
                .map(row_to_history)
                .collect()
        })
        .await
    }

    async fn find_largest_sequence(
        &self,
        namespace: &str,
        baseline_only: bool,
    ) -> LedgerResult<i64> {
        let scope = namespace.to_owned();
        self.run_blocking(move |connection| largest_sequence(connection, &scope, baseline_only))
            .await
    }

    async fn find_largest_version_since_baseline(
        &self,
        namespace: &str,
    ) -> LedgerResult<Option<String>> {
        let scope = namespace.to_owned();
        self.run_blocking(move |connection| {
            let baseline = largest_sequence(connection, &scope, true)?;
            migration_history::table
                .filter(migration_history::namespace.eq(&scope))
                .filter(migration_history::sequence.ge(baseline))
                .select(max(migration_history::version))
                .first::<Option<String>>(connection)
                .map_err(LedgerError::persistence)
        })
        .await
    }

    async fn insert_pending_history(&self, pending: &PendingMigration) -> LedgerResult<i64> {
        let new_row = to_new_row(pending);
        self.run_blocking(move |connection| {
            diesel::insert_into(migration_history::table)
                .values(&new_row)
                .returning(migration_history::id)
                .get_result::<i64>(connection)
                .map_err(LedgerError::persistence)
        })
        .await
    }

    async fn update_history_as_done(
        &self,
        id: i64,
        duration_ns: i64,
        updated_schema: &str,
        updated_at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        let schema = updated_schema.to_owned();
        self.run_blocking(move |connection| {
            let updated = diesel::update(migration_history::table.find(id))
                .set((
                    migration_history::status.eq(MigrationStatus::Done.as_str()),
                    migration_history::execution_duration_ns.eq(duration_ns),
                    migration_history::schema.eq(schema),
                    migration_history::updated_ts.eq(updated_at.timestamp()),
                ))
                .execute(connection)
                .map_err(LedgerError::persistence)?;
            ensure_updated(updated, id)
        })
        .await
    }

    async fn update_history_as_failed(
        &self,
        id: i64,
        duration_ns: i64,
        updated_at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        self.run_blocking(move |connection| {
            let updated = diesel::update(migration_history::table.find(id))
                .set((
                    migration_history::status.eq(MigrationStatus::Failed.as_str()),
                    migration_history::execution_duration_ns.eq(duration_ns),
                    migration_history::updated_ts.eq(updated_at.timestamp()),
                ))
                .execute(connection)
                .map_err(LedgerError::persistence)?;
            ensure_updated(updated, id)
        })
        .await
    }
}

fn largest_sequence(
    connection: &mut PgConnection,
    namespace: &str,
    baseline_only: bool,
) -> LedgerResult<i64> {
    let scoped = migration_history::table.filter(migration_history::namespace.eq(namespace));
    let largest = if baseline_only {
        scoped
            .filter(migration_history::migration_type.eq_any(BASELINE_TYPES))
            .select(max(migration_history::sequence))
            .first::<Option<i64>>(connection)
    } else {
        scoped
            .select(max(migration_history::sequence))
            .first::<Option<i64>>(connection)
    }
    .map_err(LedgerError::persistence)?;
    Ok(largest.unwrap_or(0))
}

const fn ensure_updated(updated: usize, id: i64) -> LedgerResult<()> {
    if updated == 0 {
        return Err(LedgerError::NotFound(id));
    }
    Ok(())
}

pub(crate) fn to_new_row(pending: &PendingMigration) -> NewMigrationHistoryRow {
    let created_ts = pending.created_at.timestamp();
    NewMigrationHistoryRow {
        created_by: pending.creator.clone(),
        created_ts,
        updated_by: pending.creator.clone(),
        updated_ts: created_ts,
        release_version: pending.release_version.clone(),
        namespace: pending.namespace.clone(),
        sequence: pending.sequence,
        source: pending.source.as_str().to_owned(),
        migration_type: pending.migration_type.as_str().to_owned(),
        status: MigrationStatus::Pending.as_str().to_owned(),
        version: pending.version.clone(),
        description: pending.description.clone(),
        statement: pending.statement.clone(),
        schema: pending.schema_prev.clone(),
        schema_prev: pending.schema_prev.clone(),
        execution_duration_ns: 0,
        issue_id: pending
            .issue_id
            .map(|issue_id| issue_id.to_string())
            .unwrap_or_default(),
        payload: pending.payload.clone(),
    }
}

pub(crate) fn row_to_history(row: MigrationHistoryRow) -> LedgerResult<MigrationHistory> {
    let issue_id = if row.issue_id.is_empty() {
        None
    } else {
        let parsed = row
            .issue_id
            .parse::<i64>()
            .map_err(LedgerError::persistence)?;
        Some(IssueId::new(parsed))
    };

    Ok(MigrationHistory {
        id: row.id,
        created_by: row.created_by,
        created_at: epoch_seconds(row.created_ts)?,
        updated_by: row.updated_by,
        updated_at: epoch_seconds(row.updated_ts)?,
        release_version: row.release_version,
        namespace: row.namespace,
        sequence: row.sequence,
        source: MigrationSource::try_from(row.source.as_str())?,
        migration_type: MigrationType::try_from(row.migration_type.as_str())?,
        status: MigrationStatus::try_from(row.status.as_str())?,
        version: row.version,
        description: row.description,
        statement: row.statement,
        schema: row.schema,
        schema_prev: row.schema_prev,
        execution_duration_ns: row.execution_duration_ns,
        issue_id,
        payload: row.payload,
    })
}

fn epoch_seconds(seconds: i64) -> LedgerResult<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
        LedgerError::persistence(std::io::Error::other(format!(
            "timestamp {seconds} is out of range"
        )))
    })
}
