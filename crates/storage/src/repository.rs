use async_trait::async_trait;
use progress_core::model::ProgressRecord;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Suffix appended to a checklist cache key to form its storage key.
pub const PROGRESS_KEY_SUFFIX: &str = "_progress";

/// Storage key holding the id of the user the cached progress belongs to.
pub const OWNER_TAG_KEY: &str = "progress_owner_id";

/// Storage key set while the owner's anonymous progress still awaits import.
pub const MIGRATION_PENDING_KEY: &str = "progress_migration_pending";

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Storage key for a checklist cache key (`python_dsa` -> `python_dsa_progress`).
#[must_use]
pub fn progress_storage_key(cache_key: &str) -> String {
    format!("{cache_key}{PROGRESS_KEY_SUFFIX}")
}

/// Inverse of `progress_storage_key`; `None` for keys that carry no progress.
#[must_use]
pub fn cache_key_of(storage_key: &str) -> Option<&str> {
    storage_key.strip_suffix(PROGRESS_KEY_SUFFIX)
}

/// Decodes a stored blob. Malformed JSON counts as no data.
pub(crate) fn decode_record(storage_key: &str, raw: &str) -> Option<ProgressRecord> {
    match serde_json::from_str(raw) {
        Ok(record) => Some(record),
        Err(err) => {
            tracing::warn!(key = storage_key, error = %err, "skipping malformed progress entry");
            None
        }
    }
}

pub(crate) fn encode_record(record: &ProgressRecord) -> Result<String, StorageError> {
    serde_json::to_string(record).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Local, device-side copy of every checklist's progress.
///
/// Every write is complete once the returned future resolves; callers rely
/// on this before attempting any remote write.
#[async_trait]
pub trait ProgressCache: Send + Sync {
    /// Store the record for a checklist, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn write(&self, cache_key: &str, record: &ProgressRecord) -> Result<(), StorageError>;

    /// Fetch the record for a checklist.
    ///
    /// Returns `Ok(None)` when nothing is stored or the stored blob is malformed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn read(&self, cache_key: &str) -> Result<Option<ProgressRecord>, StorageError>;

    /// Delete the record for a checklist. Missing records are not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn remove(&self, cache_key: &str) -> Result<(), StorageError>;

    /// Cache keys of every stored checklist, sorted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn list_progress_keys(&self) -> Result<Vec<String>, StorageError>;
}

/// Persisted id of the user the local cache belongs to.
#[async_trait]
pub trait OwnerTagRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn owner(&self) -> Result<Option<String>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn set_owner(&self, user_id: &str) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn clear_owner(&self) -> Result<(), StorageError>;

    /// Whether the owner's earlier import attempt failed and must be retried.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn migration_pending(&self) -> Result<bool, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn set_migration_pending(&self, pending: bool) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Values are kept as raw strings, like a browser key/value store.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw value under a storage key, bypassing encoding.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn insert_raw(&self, storage_key: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(storage_key.to_owned(), value.to_owned());
        Ok(())
    }

    /// Raw value under a storage key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn raw(&self, storage_key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(storage_key).cloned())
    }

    fn delete_raw(&self, storage_key: &str) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(storage_key);
        Ok(())
    }
}

#[async_trait]
impl ProgressCache for InMemoryRepository {
    async fn write(&self, cache_key: &str, record: &ProgressRecord) -> Result<(), StorageError> {
        let encoded = encode_record(record)?;
        self.insert_raw(&progress_storage_key(cache_key), &encoded)
    }

    async fn read(&self, cache_key: &str) -> Result<Option<ProgressRecord>, StorageError> {
        let key = progress_storage_key(cache_key);
        Ok(self
            .raw(&key)?
            .and_then(|raw| decode_record(&key, &raw)))
    }

    async fn remove(&self, cache_key: &str) -> Result<(), StorageError> {
        self.delete_raw(&progress_storage_key(cache_key))
    }

    async fn list_progress_keys(&self) -> Result<Vec<String>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .keys()
            .filter_map(|key| cache_key_of(key))
            .map(str::to_owned)
            .collect())
    }
}

#[async_trait]
impl OwnerTagRepository for InMemoryRepository {
    async fn owner(&self) -> Result<Option<String>, StorageError> {
        self.raw(OWNER_TAG_KEY)
    }

    async fn set_owner(&self, user_id: &str) -> Result<(), StorageError> {
        self.insert_raw(OWNER_TAG_KEY, user_id)
    }

    async fn clear_owner(&self) -> Result<(), StorageError> {
        self.delete_raw(OWNER_TAG_KEY)
    }

    async fn migration_pending(&self) -> Result<bool, StorageError> {
        Ok(self.raw(MIGRATION_PENDING_KEY)?.is_some())
    }

    async fn set_migration_pending(&self, pending: bool) -> Result<(), StorageError> {
        if pending {
            self.insert_raw(MIGRATION_PENDING_KEY, "1")
        } else {
            self.delete_raw(MIGRATION_PENDING_KEY)
        }
    }
}

/// Aggregates the cache and owner tag behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressCache>,
    pub owner: Arc<dyn OwnerTagRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Build a `Storage` whose parts share one repository.
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: ProgressCache + OwnerTagRepository + Clone + 'static,
    {
        let progress: Arc<dyn ProgressCache> = Arc::new(repo.clone());
        let owner: Arc<dyn OwnerTagRepository> = Arc::new(repo);
        Self { progress, owner }
    }
}
