use std::sync::Arc;

use storage::repository::{OwnerTagRepository, ProgressCache, StorageError};

/// Result of checking the cache's owner tag against the signing-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// No tag: any cached progress was recorded anonymously.
    Unclaimed,
    /// Tag matches the user.
    Owned,
    /// Tag matches the user, whose earlier import of anonymous progress failed.
    OwnedAwaitingMigration,
    /// Tag named another user; their progress and the tag were removed.
    Purged { removed: usize },
}

/// Keeps one user's cached progress from leaking into another user's session.
#[derive(Clone)]
pub struct OwnershipGuard {
    cache: Arc<dyn ProgressCache>,
    owner: Arc<dyn OwnerTagRepository>,
}

impl OwnershipGuard {
    #[must_use]
    pub fn new(cache: Arc<dyn ProgressCache>, owner: Arc<dyn OwnerTagRepository>) -> Self {
        Self { cache, owner }
    }

    /// Compare the owner tag with `user_id`, purging on mismatch.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the tag or cache cannot be read or purged.
    pub async fn check(&self, user_id: &str) -> Result<Ownership, StorageError> {
        match self.owner.owner().await? {
            None => Ok(Ownership::Unclaimed),
            Some(tag) if tag == user_id => {
                if self.owner.migration_pending().await? {
                    Ok(Ownership::OwnedAwaitingMigration)
                } else {
                    Ok(Ownership::Owned)
                }
            }
            Some(_) => {
                let removed = self.purge().await?;
                tracing::info!(removed, "purged progress cached for a different user");
                Ok(Ownership::Purged { removed })
            }
        }
    }

    /// Tag the cache as belonging to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the tag cannot be written.
    pub async fn claim(&self, user_id: &str) -> Result<(), StorageError> {
        self.owner.set_owner(user_id).await
    }

    /// Record whether the owner's anonymous progress still awaits import.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the marker cannot be written.
    pub async fn set_migration_pending(&self, pending: bool) -> Result<(), StorageError> {
        self.owner.set_migration_pending(pending).await
    }

    /// Remove every cached checklist, the owner tag and the migration marker.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if any entry cannot be removed.
    pub async fn purge(&self) -> Result<usize, StorageError> {
        let keys = self.cache.list_progress_keys().await?;
        for key in &keys {
            self.cache.remove(key).await?;
        }
        self.owner.clear_owner().await?;
        self.owner.set_migration_pending(false).await?;
        Ok(keys.len())
    }
}
