use async_trait::async_trait;
use progress_core::model::ProgressRecord;

use super::SqliteRepository;
use crate::repository::{
    PROGRESS_KEY_SUFFIX, ProgressCache, StorageError, cache_key_of, decode_record, encode_record,
    progress_storage_key,
};

#[async_trait]
impl ProgressCache for SqliteRepository {
    async fn write(&self, cache_key: &str, record: &ProgressRecord) -> Result<(), StorageError> {
        let encoded = encode_record(record)?;
        self.put_raw(&progress_storage_key(cache_key), &encoded).await
    }

    async fn read(&self, cache_key: &str) -> Result<Option<ProgressRecord>, StorageError> {
        let key = progress_storage_key(cache_key);
        Ok(self
            .get_raw(&key)
            .await?
            .and_then(|raw| decode_record(&key, &raw)))
    }

    async fn remove(&self, cache_key: &str) -> Result<(), StorageError> {
        self.delete_raw(&progress_storage_key(cache_key)).await
    }

    async fn list_progress_keys(&self) -> Result<Vec<String>, StorageError> {
        let keys = self.keys_with_suffix(PROGRESS_KEY_SUFFIX).await?;
        Ok(keys
            .iter()
            .filter_map(|key| cache_key_of(key))
            .map(str::to_owned)
            .collect())
    }
}
