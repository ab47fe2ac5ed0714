//! In-memory backup storage.

use crate::migration::ports::{BackupStorage, BackupStorageError, BackupStorageResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory backup storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackupStorage {
    backups: Arc<RwLock<HashMap<String, String>>>,
}

fn lock_error(err: impl ToString) -> BackupStorageError {
    BackupStorageError::persistence(std::io::Error::other(err.to_string()))
}

impl InMemoryBackupStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the names of every stored backup.
    ///
    /// # Errors
    ///
    /// Returns [`BackupStorageError::Persistence`] when the lock is poisoned.
    pub fn names(&self) -> BackupStorageResult<Vec<String>> {
        let mut names: Vec<String> = self
            .backups
            .read()
            .map_err(lock_error)?
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl BackupStorage for InMemoryBackupStorage {
    async fn put(&self, name: &str, content: String) -> BackupStorageResult<()> {
        self.backups
            .write()
            .map_err(lock_error)?
            .insert(name.to_owned(), content);
        Ok(())
    }

    async fn get(&self, name: &str) -> BackupStorageResult<String> {
        self.backups
            .read()
            .map_err(lock_error)?
            .get(name)
            .cloned()
            .ok_or_else(|| BackupStorageError::NotFound(name.to_owned()))
    }
}
