//! Backup storage port.

use crate::task::{domain::ErrorCode, ports::ExecutorError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for backup storage operations.
pub type BackupStorageResult<T> = Result<T, BackupStorageError>;

/// Stores database dumps by name.
#[async_trait]
pub trait BackupStorage: Send + Sync {
    /// Stores `content` under `name`, replacing any earlier backup.
    async fn put(&self, name: &str, content: String) -> BackupStorageResult<()>;

    /// Returns the backup stored under `name`.
    async fn get(&self, name: &str) -> BackupStorageResult<String>;
}

/// Errors returned by backup storage.
#[derive(Debug, Clone, Error)]
pub enum BackupStorageError {
    /// No backup exists under the name.
    #[error("backup {0:?} not found")]
    NotFound(String),

    /// Persistence-layer failure.
    #[error("backup storage error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl BackupStorageError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    /// Returns the error code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Persistence(_) => ErrorCode::Internal,
        }
    }
}

impl From<BackupStorageError> for ExecutorError {
    fn from(err: BackupStorageError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}
