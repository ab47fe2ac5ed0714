//! Diesel row models for the migration ledger.

use super::schema::migration_history;
use diesel::prelude::*;

/// Query result row for ledger records.
#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = migration_history)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MigrationHistoryRow {
    /// Row identifier.
    #[diesel(sql_type = diesel::sql_types::Int8)]
    pub id: i64,
    /// Principal that created the row.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub created_by: String,
    /// Creation time in epoch seconds.
    #[diesel(sql_type = diesel::sql_types::Int8)]
    pub created_ts: i64,
    /// Principal that last updated the row.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub updated_by: String,
    /// Last update time in epoch seconds.
    #[diesel(sql_type = diesel::sql_types::Int8)]
    pub updated_ts: i64,
    /// Release label.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub release_version: String,
    /// Ledger namespace.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub namespace: String,
    /// Position within the namespace.
    #[diesel(sql_type = diesel::sql_types::Int8)]
    pub sequence: i64,
    /// Stored source.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub source: String,
    /// Stored row type.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub migration_type: String,
    /// Stored status.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub status: String,
    /// Stored version.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub version: String,
    /// Description.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub description: String,
    /// Executed statement.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub statement: String,
    /// Post-image schema.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub schema: String,
    /// Pre-image schema.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub schema_prev: String,
    /// Execution time in nanoseconds.
    #[diesel(sql_type = diesel::sql_types::Int8)]
    pub execution_duration_ns: i64,
    /// Requesting issue, empty when none.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub issue_id: String,
    /// Opaque JSON payload.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub payload: String,
}

/// Insert model for `Pending` ledger records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = migration_history)]
pub struct NewMigrationHistoryRow {
    /// Principal creating the row.
    pub created_by: String,
    /// Creation time in epoch seconds.
    pub created_ts: i64,
    /// Same as `created_by` on insert.
    pub updated_by: String,
    /// Same as `created_ts` on insert.
    pub updated_ts: i64,
    /// Release label.
    pub release_version: String,
    /// Ledger namespace.
    pub namespace: String,
    /// Position within the namespace.
    pub sequence: i64,
    /// Stored source.
    pub source: String,
    /// Stored row type.
    pub migration_type: String,
    /// Stored status.
    pub status: String,
    /// Stored version.
    pub version: String,
    /// Description.
    pub description: String,
    /// Statement about to run.
    pub statement: String,
    /// Pre-image, until the row is finalized.
    pub schema: String,
    /// Pre-image schema.
    pub schema_prev: String,
    /// Zero until the row is finalized.
    pub execution_duration_ns: i64,
    /// Requesting issue, empty when none.
    pub issue_id: String,
    /// Opaque JSON payload.
    pub payload: String,
}

/// Row count returned by catalog queries.
#[derive(Debug, Clone, Copy, QueryableByName)]
pub struct CountRow {
    /// Number of matching rows.
    #[diesel(sql_type = diesel::sql_types::Int8)]
    pub count: i64,
}
