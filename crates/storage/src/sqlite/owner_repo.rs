use async_trait::async_trait;

use super::SqliteRepository;
use crate::repository::{MIGRATION_PENDING_KEY, OWNER_TAG_KEY, OwnerTagRepository, StorageError};

#[async_trait]
impl OwnerTagRepository for SqliteRepository {
    async fn owner(&self) -> Result<Option<String>, StorageError> {
        self.get_raw(OWNER_TAG_KEY).await
    }

    async fn set_owner(&self, user_id: &str) -> Result<(), StorageError> {
        self.put_raw(OWNER_TAG_KEY, user_id).await
    }

    async fn clear_owner(&self) -> Result<(), StorageError> {
        self.delete_raw(OWNER_TAG_KEY).await
    }

    async fn migration_pending(&self) -> Result<bool, StorageError> {
        Ok(self.get_raw(MIGRATION_PENDING_KEY).await?.is_some())
    }

    async fn set_migration_pending(&self, pending: bool) -> Result<(), StorageError> {
        if pending {
            self.put_raw(MIGRATION_PENDING_KEY, "1").await
        } else {
            self.delete_raw(MIGRATION_PENDING_KEY).await
        }
    }
}
