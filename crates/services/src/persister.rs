use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use progress_core::model::{ChecklistPayload, ProgressState};
use storage::repository::{ProgressCache, StorageError};
use tokio::task::JoinHandle;

use crate::remote::ProgressApi;

/// Mirrors state changes to the local cache and coalesces remote writes.
///
/// Every observed change is written to the cache before this returns. The
/// remote write happens once the state has been quiet for `quiet_period`;
/// a change during that window restarts the timer, so a burst of toggles
/// produces one request carrying the final state.
///
/// Each armed write is bound to the verified user current when it was armed
/// and is dropped if a different user (or nobody) is current when it fires.
pub struct BatchPersister {
    cache: Arc<dyn ProgressCache>,
    api: Arc<dyn ProgressApi>,
    quiet_period: Duration,
    remote_user: Arc<Mutex<Option<String>>>,
    loads_in_flight: AtomicUsize,
    pending: Mutex<Option<JoinHandle<()>>>,
}

/// Suppresses persistence while a reconciliation load is running.
///
/// Dropping the guard ends the suppression, including on early return.
pub struct LoadingGuard<'a> {
    persister: &'a BatchPersister,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.persister.loads_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl BatchPersister {
    #[must_use]
    pub fn new(
        cache: Arc<dyn ProgressCache>,
        api: Arc<dyn ProgressApi>,
        quiet_period: Duration,
    ) -> Self {
        Self {
            cache,
            api,
            quiet_period,
            remote_user: Arc::new(Mutex::new(None)),
            loads_in_flight: AtomicUsize::new(0),
            pending: Mutex::new(None),
        }
    }

    /// The verified user remote writes belong to; `None` keeps writes local.
    pub fn set_remote_user(&self, user_id: Option<&str>) {
        *self.remote_user.lock().unwrap_or_else(PoisonError::into_inner) =
            user_id.map(str::to_owned);
    }

    fn current_user(remote_user: &Mutex<Option<String>>) -> Option<String> {
        remote_user
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn begin_load(&self) -> LoadingGuard<'_> {
        self.loads_in_flight.fetch_add(1, Ordering::SeqCst);
        LoadingGuard { persister: self }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loads_in_flight.load(Ordering::SeqCst) > 0
    }

    /// React to a new state: mirror to the cache, then (re)arm the timer.
    ///
    /// Skipped while loading. A state without any progress only drops the
    /// armed write, so a cleared checklist is not re-uploaded.
    ///
    /// Callers must not run two `observe` calls concurrently; the later
    /// state has to be the one mirrored last.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache mirror fails; no timer is armed then.
    pub async fn observe(&self, state: &ProgressState) -> Result<bool, StorageError> {
        if self.is_loading() {
            return Ok(false);
        }
        if state.is_empty() {
            self.cancel();
            return Ok(false);
        }
        self.mirror(state).await?;
        self.schedule(state.payloads());
        Ok(true)
    }

    /// Write every non-empty checklist to the cache.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on the first failed write.
    pub async fn mirror(&self, state: &ProgressState) -> Result<(), StorageError> {
        for (key, record) in state.non_empty() {
            self.cache.write(key, record).await?;
        }
        Ok(())
    }

    fn schedule(&self, payloads: Vec<ChecklistPayload>) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        let Some(armed_by) = Self::current_user(&self.remote_user) else {
            return;
        };

        let api = Arc::clone(&self.api);
        let remote_user = Arc::clone(&self.remote_user);
        let quiet_period = self.quiet_period;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            if Self::current_user(&remote_user).as_deref() != Some(armed_by.as_str()) {
                tracing::debug!("dropping progress write armed for a previous session");
                return;
            }
            match api.batch_update_all(&payloads).await {
                Ok(()) => tracing::debug!(checklists = payloads.len(), "persisted progress"),
                Err(err) => tracing::warn!(error = %err, "batched progress write failed"),
            }
        }));
    }

    /// Drop any armed timer without writing.
    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = pending.take() {
            handle.abort();
        }
    }

    /// Wait for the armed timer, if any, to fire and finish its write.
    pub async fn wait_idle(&self) {
        let handle = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
            && !err.is_cancelled()
        {
            tracing::warn!(error = %err, "progress persist task failed");
        }
    }
}

impl Drop for BatchPersister {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeApi, record};
    use progress_core::model::ProgressRecord;
    use storage::repository::InMemoryRepository;

    fn persister(repo: &InMemoryRepository) -> (BatchPersister, Arc<FakeApi>) {
        let api = Arc::new(FakeApi::default());
        let persister = BatchPersister::new(
            Arc::new(repo.clone()),
            Arc::clone(&api) as Arc<dyn ProgressApi>,
            Duration::from_millis(500),
        );
        persister.set_remote_user(Some("u"));
        (persister, api)
    }

    fn state_with(items: &[(&str, bool)]) -> ProgressState {
        let mut state = ProgressState::new();
        state.insert("python_dsa", record(items));
        state.insert("gate", ProgressRecord::new());
        state
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_changes_is_one_write_with_final_state() {
        let repo = InMemoryRepository::new();
        let (persister, api) = persister(&repo);

        let mut items = Vec::new();
        for name in ["a", "b", "c", "d", "e"] {
            items.push((name, true));
            persister.observe(&state_with(&items)).await.unwrap();
            tokio::time::advance(Duration::from_millis(100)).await;
        }
        assert!(api.batches().is_empty());

        persister.wait_idle().await;
        let batches = api.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].items, record(&items));
    }

    #[tokio::test(start_paused = true)]
    async fn cache_is_written_before_timer_fires() {
        let repo = InMemoryRepository::new();
        let (persister, api) = persister(&repo);

        persister
            .observe(&state_with(&[("Two Pointers", true)]))
            .await
            .unwrap();
        assert_eq!(
            repo.read("python_dsa").await.unwrap(),
            Some(record(&[("Two Pointers", true)]))
        );
        assert!(repo.read("gate").await.unwrap().is_none());
        assert!(api.batches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unverified_users_stay_local() {
        let repo = InMemoryRepository::new();
        let (persister, api) = persister(&repo);
        persister.set_remote_user(None);

        persister.observe(&state_with(&[("x", true)])).await.unwrap();
        persister.wait_idle().await;
        assert!(api.batches().is_empty());
        assert!(repo.read("python_dsa").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn loading_and_empty_states_are_not_persisted() {
        let repo = InMemoryRepository::new();
        let (persister, api) = persister(&repo);

        {
            let _loading = persister.begin_load();
            assert!(!persister.observe(&state_with(&[("x", true)])).await.unwrap());
        }
        assert!(!persister.is_loading());
        assert!(!persister.observe(&ProgressState::new()).await.unwrap());

        persister.wait_idle().await;
        assert!(api.batches().is_empty());
        assert!(repo.list_progress_keys().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn write_armed_for_one_user_is_not_sent_for_another() {
        let repo = InMemoryRepository::new();
        let (persister, api) = persister(&repo);

        persister.observe(&state_with(&[("x", true)])).await.unwrap();
        persister.set_remote_user(Some("someone-else"));
        persister.wait_idle().await;
        assert!(api.batches().is_empty());

        persister.set_remote_user(None);
        persister.observe(&state_with(&[("y", true)])).await.unwrap();
        persister.set_remote_user(Some("u"));
        persister.wait_idle().await;
        assert!(api.batches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn emptied_state_drops_armed_write() {
        let repo = InMemoryRepository::new();
        let (persister, api) = persister(&repo);

        persister.observe(&state_with(&[("x", true)])).await.unwrap();
        assert!(!persister.observe(&state_with(&[])).await.unwrap());
        persister.wait_idle().await;
        assert!(api.batches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_pending_write() {
        let repo = InMemoryRepository::new();
        let (persister, api) = persister(&repo);

        persister.observe(&state_with(&[("x", true)])).await.unwrap();
        persister.cancel();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(api.batches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_keeps_cache() {
        let repo = InMemoryRepository::new();
        let (persister, api) = persister(&repo);
        api.set_failing(true);

        persister.observe(&state_with(&[("x", true)])).await.unwrap();
        persister.wait_idle().await;
        assert!(api.batches().is_empty());
        assert_eq!(
            repo.read("python_dsa").await.unwrap(),
            Some(record(&[("x", true)]))
        );
    }
}
