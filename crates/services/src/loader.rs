use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use progress_core::model::{ChecklistCatalog, ChecklistId, ProgressRecord, ProgressState};
use storage::repository::{ProgressCache, StorageError};

use crate::remote::ProgressApi;

/// Picks the authoritative record for one checklist.
///
/// A non-empty remote record always wins; an empty or missing one falls
/// back to the local record so a transient empty response cannot wipe it.
#[must_use]
pub fn reconcile(remote: Option<ProgressRecord>, local: Option<ProgressRecord>) -> ProgressRecord {
    match remote {
        Some(remote) if !remote.is_empty() => remote,
        _ => local.unwrap_or_default(),
    }
}

/// Builds a fresh `ProgressState` from the local cache and, when allowed,
/// the remote store.
#[derive(Clone)]
pub struct ReconciliationLoader {
    cache: Arc<dyn ProgressCache>,
    api: Arc<dyn ProgressApi>,
    catalog: ChecklistCatalog,
}

impl ReconciliationLoader {
    #[must_use]
    pub fn new(
        cache: Arc<dyn ProgressCache>,
        api: Arc<dyn ProgressApi>,
        catalog: ChecklistCatalog,
    ) -> Self {
        Self {
            cache,
            api,
            catalog,
        }
    }

    /// Load every checklist.
    ///
    /// Remote failures degrade to the local-only path.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the local cache cannot be read or written.
    pub async fn load_all(&self, can_use_remote: bool) -> Result<ProgressState, StorageError> {
        if !can_use_remote {
            return self.load_local().await;
        }

        let snapshot = match self.api.load_all().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(error = %err, "remote progress load failed, using local cache");
                return self.load_local().await;
            }
        };

        let mut remote: BTreeMap<String, ProgressRecord> =
            snapshot.into_cache_entries().into_iter().collect();
        let mut keys = self.known_keys().await?;
        keys.extend(remote.keys().cloned());

        let mut state = ProgressState::new();
        for key in keys {
            let remote_record = remote.remove(&key);
            let local_record = self.cache.read(&key).await?;
            let merged = reconcile(remote_record, local_record);
            if !merged.is_empty() {
                self.cache.write(&key, &merged).await?;
            }
            state.insert(key, merged);
        }

        tracing::debug!(checklists = state.len(), "loaded progress from remote");
        Ok(state)
    }

    /// Refresh one checklist from the remote store with the same fallback rule.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the local cache cannot be read or written.
    pub async fn load_one(&self, cache_key: &str) -> Result<ProgressRecord, StorageError> {
        let checklist = ChecklistId::from_cache_key(cache_key);
        let remote = match self.api.get(&checklist).await {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(checklist = %checklist, error = %err, "remote checklist fetch failed");
                None
            }
        };
        let merged = reconcile(remote, self.cache.read(cache_key).await?);
        if !merged.is_empty() {
            self.cache.write(cache_key, &merged).await?;
        }
        Ok(merged)
    }

    async fn load_local(&self) -> Result<ProgressState, StorageError> {
        let mut state = ProgressState::new();
        for key in self.known_keys().await? {
            let record = self.cache.read(&key).await?.unwrap_or_default();
            state.insert(key, record);
        }
        Ok(state)
    }

    /// Catalogued checklists plus anything already in the cache.
    async fn known_keys(&self) -> Result<BTreeSet<String>, StorageError> {
        let mut keys: BTreeSet<String> = self.catalog.cache_keys().into_iter().collect();
        keys.extend(self.cache.list_progress_keys().await?);
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeApi, record};
    use storage::repository::InMemoryRepository;

    fn catalog() -> ChecklistCatalog {
        ChecklistCatalog::new(vec!["python".into()], vec!["gate".into()])
    }

    fn loader(repo: &InMemoryRepository, api: FakeApi) -> (ReconciliationLoader, Arc<FakeApi>) {
        let api = Arc::new(api);
        let loader = ReconciliationLoader::new(
            Arc::new(repo.clone()),
            Arc::clone(&api) as Arc<dyn ProgressApi>,
            catalog(),
        );
        (loader, api)
    }

    #[test]
    fn reconcile_prefers_non_empty_remote() {
        let remote = record(&[("a", false)]);
        let local = record(&[("a", true), ("b", true)]);
        assert_eq!(reconcile(Some(remote.clone()), Some(local.clone())), remote);
        assert_eq!(reconcile(Some(ProgressRecord::new()), Some(local.clone())), local);
        assert_eq!(reconcile(None, None), ProgressRecord::new());
    }

    #[tokio::test]
    async fn local_load_defaults_catalog_keys_to_empty() {
        let repo = InMemoryRepository::new();
        repo.write("rust_dev", &record(&[("Traits", true)]))
            .await
            .unwrap();
        let (loader, api) = loader(&repo, FakeApi::default());

        let state = loader.load_all(false).await.unwrap();
        assert_eq!(api.loads(), 0);
        assert!(state.get("python_dsa").unwrap().is_empty());
        assert!(state.get("dsa").unwrap().is_empty());
        assert!(state.get("gate").unwrap().is_empty());
        assert!(state.get("rust_dev").unwrap().is_done("Traits"));
    }

    #[tokio::test]
    async fn empty_remote_never_destroys_local() {
        let repo = InMemoryRepository::new();
        repo.write("gate", &record(&[("done", true)])).await.unwrap();
        let api = FakeApi::default().with_record("gate", ProgressRecord::new());
        let (loader, _) = loader(&repo, api);

        let state = loader.load_all(true).await.unwrap();
        assert_eq!(state.get("gate"), Some(&record(&[("done", true)])));
    }

    #[tokio::test]
    async fn non_empty_remote_wins_and_is_cached() {
        let repo = InMemoryRepository::new();
        repo.write("python_dsa", &record(&[("Stacks", true)]))
            .await
            .unwrap();
        let api = FakeApi::default()
            .with_record("python_dsa", record(&[("Queues", true)]))
            .with_record("go_dsa", record(&[("Maps", true)]));
        let (loader, _) = loader(&repo, api);

        let state = loader.load_all(true).await.unwrap();
        assert_eq!(state.get("python_dsa"), Some(&record(&[("Queues", true)])));
        assert_eq!(state.get("go_dsa"), Some(&record(&[("Maps", true)])));
        assert_eq!(
            repo.read("python_dsa").await.unwrap(),
            Some(record(&[("Queues", true)]))
        );
        assert_eq!(
            repo.read("go_dsa").await.unwrap(),
            Some(record(&[("Maps", true)]))
        );
    }

    #[tokio::test]
    async fn remote_failure_degrades_to_local() {
        let repo = InMemoryRepository::new();
        repo.write("dsa", &record(&[("Heaps", true)])).await.unwrap();
        let (loader, api) = loader(&repo, FakeApi::default());
        api.set_failing(true);

        let state = loader.load_all(true).await.unwrap();
        assert_eq!(api.loads(), 1);
        assert!(state.get("dsa").unwrap().is_done("Heaps"));
    }

    #[tokio::test]
    async fn load_one_falls_back_when_remote_is_empty() {
        let repo = InMemoryRepository::new();
        repo.write("gate", &record(&[("OS", true)])).await.unwrap();
        let (loader, _) = loader(&repo, FakeApi::default());

        let refreshed = loader.load_one("gate").await.unwrap();
        assert!(refreshed.is_done("OS"));
    }
}
