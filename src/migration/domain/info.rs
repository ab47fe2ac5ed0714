//! Description of one migration handed to the ledger protocol.

use super::{MigrationSource, MigrationType, MigrationVersion};
use crate::task::domain::IssueId;

/// Everything the ledger records about a migration besides its statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationInfo {
    /// Release label of the running service.
    pub release_version: String,
    /// Submitted schema version.
    pub version: MigrationVersion,
    /// Ledger namespace, normally the database name.
    pub namespace: String,
    /// Target database.
    pub database: String,
    /// Where the change originated.
    pub source: MigrationSource,
    /// Kind of row to record.
    pub migration_type: MigrationType,
    /// Human-readable description.
    pub description: String,
    /// Name of the principal applying the change.
    pub creator: String,
    /// Issue that requested the change.
    pub issue_id: Option<IssueId>,
    /// Opaque JSON payload stored with the row.
    pub payload: String,
    /// The statement creates `database`, so nothing can be dumped before it
    /// runs.
    pub create_database: bool,
    /// Reuse a pending or failed row for the same version.
    pub force: bool,
}

impl MigrationInfo {
    /// Creates a `Migrate` row description for `database`, using the
    /// database name as namespace.
    pub fn new(database: impl Into<String>, version: MigrationVersion) -> Self {
        let database = database.into();
        Self {
            release_version: String::new(),
            version,
            namespace: database.clone(),
            database,
            source: MigrationSource::Ui,
            migration_type: MigrationType::Migrate,
            description: String::new(),
            creator: String::new(),
            issue_id: None,
            payload: String::new(),
            create_database: false,
            force: false,
        }
    }

    /// Sets the row type.
    #[must_use]
    pub const fn with_type(mut self, migration_type: MigrationType) -> Self {
        self.migration_type = migration_type;
        self
    }

    /// Sets the originating source.
    #[must_use]
    pub const fn with_source(mut self, source: MigrationSource) -> Self {
        self.source = source;
        self
    }

    /// Sets the requesting issue.
    #[must_use]
    pub const fn with_issue(mut self, issue_id: Option<IssueId>) -> Self {
        self.issue_id = issue_id;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the creator name.
    #[must_use]
    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    /// Sets the release label.
    #[must_use]
    pub fn with_release_version(mut self, release_version: impl Into<String>) -> Self {
        self.release_version = release_version.into();
        self
    }

    /// Marks the statement as creating the target database.
    #[must_use]
    pub const fn creating_database(mut self) -> Self {
        self.create_database = true;
        self
    }

    /// Sets whether pending or failed rows are reused.
    #[must_use]
    pub const fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}
