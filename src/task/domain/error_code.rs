//! Numeric error codes stored with failed tasks and check runs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified error code.
///
/// Values are stable and shared with downstream automation, so they are
/// serialised as integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum ErrorCode {
    /// No error.
    #[default]
    Ok,
    /// Unclassified internal failure, including recovered panics.
    Internal,
    /// The caller lacks permission.
    NotAuthorized,
    /// The request or payload is malformed.
    Invalid,
    /// A referenced record does not exist.
    NotFound,
    /// The request conflicts with current state.
    Conflict,
    /// The operation is not supported for this task type.
    NotImplemented,
    /// The target database could not be reached.
    DbConnectionFailure,
    /// The target database rejected a statement.
    DbExecutionError,
    /// The migration ledger has not been set up on the instance.
    MigrationSchemaMissing,
    /// The migration was already applied.
    MigrationAlreadyApplied,
    /// The migration version is not newer than the latest applied one.
    MigrationOutOfOrder,
    /// No baseline exists for the namespace.
    MigrationBaselineMissing,
    /// A previous attempt of the migration is still pending.
    MigrationPending,
    /// A previous attempt of the migration failed or conflicts.
    MigrationFailed,
}

impl ErrorCode {
    /// Returns the numeric value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Internal => 1,
            Self::NotAuthorized => 2,
            Self::Invalid => 3,
            Self::NotFound => 4,
            Self::Conflict => 5,
            Self::NotImplemented => 6,
            Self::DbConnectionFailure => 101,
            Self::DbExecutionError => 102,
            Self::MigrationSchemaMissing => 201,
            Self::MigrationAlreadyApplied => 202,
            Self::MigrationOutOfOrder => 203,
            Self::MigrationBaselineMissing => 204,
            Self::MigrationPending => 205,
            Self::MigrationFailed => 206,
        }
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code.as_i32()
    }
}

impl TryFrom<i32> for ErrorCode {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        let code = match value {
            0 => Self::Ok,
            1 => Self::Internal,
            2 => Self::NotAuthorized,
            3 => Self::Invalid,
            4 => Self::NotFound,
            5 => Self::Conflict,
            6 => Self::NotImplemented,
            101 => Self::DbConnectionFailure,
            102 => Self::DbExecutionError,
            201 => Self::MigrationSchemaMissing,
            202 => Self::MigrationAlreadyApplied,
            203 => Self::MigrationOutOfOrder,
            204 => Self::MigrationBaselineMissing,
            205 => Self::MigrationPending,
            206 => Self::MigrationFailed,
            other => return Err(format!("unknown error code: {other}")),
        };
        Ok(code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}
