//! Diesel schema for the migration ledger.

diesel::table! {
    /// Ledger of migrations applied to the instance.
    migration_history (id) {
        /// Row identifier.
        id -> Int8,
        /// Principal that created the row.
        created_by -> Text,
        /// Creation time in epoch seconds.
        created_ts -> Int8,
        /// Principal that last updated the row.
        updated_by -> Text,
        /// Last update time in epoch seconds.
        updated_ts -> Int8,
        /// Release label of the service that wrote the row.
        release_version -> Text,
        /// Ledger namespace.
        namespace -> Text,
        /// Position within the namespace.
        sequence -> Int8,
        /// Origin of the change.
        source -> Text,
        /// Row type.
        #[sql_name = "type"]
        migration_type -> Text,
        /// Row status.
        status -> Text,
        /// Stored version.
        version -> Text,
        /// Human-readable description.
        description -> Text,
        /// Executed statement.
        statement -> Text,
        /// Schema after the change.
        schema -> Text,
        /// Schema before the change.
        schema_prev -> Text,
        /// Execution time in nanoseconds.
        execution_duration_ns -> Int8,
        /// Requesting issue, empty when none.
        issue_id -> Text,
        /// Opaque JSON payload.
        payload -> Text,
    }
}
