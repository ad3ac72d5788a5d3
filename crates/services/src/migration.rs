use std::sync::Arc;

use progress_core::model::ChecklistPayload;
use storage::repository::{ProgressCache, StorageError};

use crate::remote::ProgressApi;

/// Outcome of shipping locally recorded progress to a new account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The cache held no progress.
    NothingToMigrate,
    Imported { checklists: usize },
    /// The import request failed; the cache is untouched for a later retry.
    Failed,
}

/// Collects non-empty cached checklists and submits them as one bulk import.
///
/// Shared by the login transition and the signup verification path.
#[derive(Clone)]
pub struct MigrationEngine {
    cache: Arc<dyn ProgressCache>,
    api: Arc<dyn ProgressApi>,
}

impl MigrationEngine {
    #[must_use]
    pub fn new(cache: Arc<dyn ProgressCache>, api: Arc<dyn ProgressApi>) -> Self {
        Self { cache, api }
    }

    /// Every non-empty cached checklist as an import payload.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be read.
    pub async fn collect(&self) -> Result<Vec<ChecklistPayload>, StorageError> {
        let mut payloads = Vec::new();
        for key in self.cache.list_progress_keys().await? {
            if let Some(record) = self.cache.read(&key).await?
                && !record.is_empty()
            {
                payloads.push(ChecklistPayload::from_cache_key(&key, record));
            }
        }
        Ok(payloads)
    }

    /// Collect and submit. Remote failures are logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be read.
    pub async fn run(&self) -> Result<MigrationOutcome, StorageError> {
        let payloads = self.collect().await?;
        if payloads.is_empty() {
            return Ok(MigrationOutcome::NothingToMigrate);
        }

        match self.api.migrate_signup_progress(&payloads).await {
            Ok(()) => {
                tracing::info!(checklists = payloads.len(), "migrated local progress");
                Ok(MigrationOutcome::Imported {
                    checklists: payloads.len(),
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, "progress migration failed, keeping local cache");
                Ok(MigrationOutcome::Failed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeApi, record};
    use progress_core::model::{ChecklistKind, ProgressRecord};
    use storage::repository::InMemoryRepository;

    fn engine(repo: &InMemoryRepository) -> (MigrationEngine, Arc<FakeApi>) {
        let api = Arc::new(FakeApi::default());
        let engine = MigrationEngine::new(
            Arc::new(repo.clone()),
            Arc::clone(&api) as Arc<dyn ProgressApi>,
        );
        (engine, api)
    }

    #[tokio::test]
    async fn empty_cache_is_a_no_op() {
        let repo = InMemoryRepository::new();
        repo.write("gate", &ProgressRecord::new()).await.unwrap();
        let (engine, api) = engine(&repo);

        assert_eq!(engine.run().await.unwrap(), MigrationOutcome::NothingToMigrate);
        assert!(api.migrations().is_empty());
    }

    #[tokio::test]
    async fn imports_resolved_checklists_in_one_call() {
        let repo = InMemoryRepository::new();
        repo.write("python_dsa", &record(&[("Two Pointers", true)]))
            .await
            .unwrap();
        repo.write("dsa", &record(&[("Graphs", false)])).await.unwrap();
        repo.insert_raw("gate_progress", "oops").unwrap();
        let (engine, api) = engine(&repo);

        assert_eq!(
            engine.run().await.unwrap(),
            MigrationOutcome::Imported { checklists: 2 }
        );
        let calls = api.migrations();
        assert_eq!(calls.len(), 1);
        let python = calls[0]
            .iter()
            .find(|payload| payload.kind == ChecklistKind::LanguageDsa)
            .unwrap();
        assert_eq!(python.id, "python");
        assert_eq!(python.items, record(&[("Two Pointers", true)]));
    }

    #[tokio::test]
    async fn failure_leaves_cache_intact() {
        let repo = InMemoryRepository::new();
        repo.write("rust_dev", &record(&[("Lifetimes", true)]))
            .await
            .unwrap();
        let (engine, api) = engine(&repo);
        api.set_failing(true);

        assert_eq!(engine.run().await.unwrap(), MigrationOutcome::Failed);
        assert_eq!(
            repo.read("rust_dev").await.unwrap(),
            Some(record(&[("Lifetimes", true)]))
        );
    }
}
