use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use progress_core::model::{ChecklistId, ProgressRecord, ProgressState, ResourceKey};
use progress_core::toggle::{
    self, CascadeChoice, CompletionRequest, PendingCompletion, ResourceToggle, Topic, TopicState,
};
use storage::repository::{ProgressCache, Storage};
use tokio::sync::Mutex as AsyncMutex;

use crate::auth::AuthStatus;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::guard::{Ownership, OwnershipGuard};
use crate::loader::ReconciliationLoader;
use crate::migration::{MigrationEngine, MigrationOutcome};
use crate::persister::BatchPersister;
use crate::remote::ProgressApi;

/// Outcome of a reconciliation load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// A newer load was issued while this one ran; its result was dropped.
    Superseded,
    /// The load failed after a successful import; the previous state was kept.
    Failed,
}

/// What an authentication change did to the local progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Same verification state and user; nothing reloaded.
    Unchanged,
    Reloaded(LoadOutcome),
    /// Another user's cache was destroyed; no import was attempted.
    Purged { removed: usize, load: LoadOutcome },
    Migrated { checklists: usize, load: LoadOutcome },
    /// The import failed; local progress is kept for the next attempt.
    MigrationFailed(LoadOutcome),
}

/// A topic completion waiting for the cascade decision.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a pending decision does nothing until resolved"]
pub struct PendingDecision {
    cache_key: String,
    pending: PendingCompletion,
}

impl PendingDecision {
    #[must_use]
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    #[must_use]
    pub fn topic(&self) -> &Topic {
        self.pending.topic()
    }
}

/// Result of asking to toggle a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Applied(TopicState),
    NeedsDecision(PendingDecision),
}

/// Owns the in-memory progress state and keeps it in sync with the local
/// cache and the remote store across authentication changes.
pub struct ProgressSyncService {
    state: Mutex<ProgressState>,
    auth: Mutex<AuthStatus>,
    load_seq: AtomicU64,
    /// Serializes cache mirroring so the latest state is always written last.
    persist_lock: AsyncMutex<()>,
    cache: Arc<dyn ProgressCache>,
    api: Arc<dyn ProgressApi>,
    loader: ReconciliationLoader,
    guard: OwnershipGuard,
    migration: MigrationEngine,
    persister: BatchPersister,
}

impl ProgressSyncService {
    #[must_use]
    pub fn new(storage: &Storage, api: Arc<dyn ProgressApi>, config: &SyncConfig) -> Self {
        let cache = Arc::clone(&storage.progress);
        Self {
            state: Mutex::new(ProgressState::new()),
            auth: Mutex::new(AuthStatus::Anonymous),
            load_seq: AtomicU64::new(0),
            persist_lock: AsyncMutex::new(()),
            loader: ReconciliationLoader::new(
                Arc::clone(&cache),
                Arc::clone(&api),
                config.catalog.clone(),
            ),
            guard: OwnershipGuard::new(Arc::clone(&cache), Arc::clone(&storage.owner)),
            migration: MigrationEngine::new(Arc::clone(&cache), Arc::clone(&api)),
            persister: BatchPersister::new(
                Arc::clone(&cache),
                Arc::clone(&api),
                config.quiet_period,
            ),
            cache,
            api,
        }
    }

    //
    // ─── LIFECYCLE ─────────────────────────────────────────────────────────────
    //

    /// Initial population. A verified user is treated as a fresh login.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if local storage fails.
    pub async fn mount(&self, auth: AuthStatus) -> Result<SyncOutcome, SyncError> {
        self.switch_session(auth.clone()).await?;
        match auth.verified_user() {
            Some(user_id) => self.login_transition(user_id).await,
            None => Ok(SyncOutcome::Reloaded(self.reload().await?)),
        }
    }

    /// Apply an authentication change (login, logout, verification).
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if local storage fails.
    pub async fn set_auth(&self, auth: AuthStatus) -> Result<SyncOutcome, SyncError> {
        let previous = self.auth()?;
        if previous.can_use_remote() == auth.can_use_remote()
            && previous.verified_user() == auth.verified_user()
        {
            *self.auth.lock().map_err(|_| SyncError::StatePoisoned)? = auth;
            return Ok(SyncOutcome::Unchanged);
        }
        self.switch_session(auth.clone()).await?;
        match auth.verified_user() {
            Some(user_id) => self.login_transition(user_id).await,
            None => Ok(SyncOutcome::Reloaded(self.reload().await?)),
        }
    }

    /// First verification of a brand-new account: progress recorded before
    /// the account existed is imported, whatever the previous auth state.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if local storage fails.
    pub async fn complete_signup(&self, user_id: &str) -> Result<SyncOutcome, SyncError> {
        self.switch_session(AuthStatus::verified(user_id)).await?;
        self.login_transition(user_id).await
    }

    /// Stop any pending remote write.
    pub fn unmount(&self) {
        self.persister.cancel();
    }

    /// Wait until a pending batched write, if any, has been sent.
    pub async fn flush(&self) {
        self.persister.wait_idle().await;
    }

    /// Settle the armed remote write and hand the persister to the new session.
    ///
    /// A write armed by the outgoing verified user is flushed while that user
    /// is still current, unless another verified user takes over, in which
    /// case it is dropped before the guard runs.
    async fn switch_session(&self, auth: AuthStatus) -> Result<(), SyncError> {
        let previous = self.auth()?;
        match (previous.verified_user(), auth.verified_user()) {
            (Some(before), Some(after)) if before != after => self.persister.cancel(),
            (Some(_), _) => self.persister.wait_idle().await,
            (None, _) => self.persister.cancel(),
        }
        self.persister.set_remote_user(auth.verified_user());
        *self.auth.lock().map_err(|_| SyncError::StatePoisoned)? = auth;
        Ok(())
    }

    // The cache is tagged before any reload can mirror remote records into it.
    async fn login_transition(&self, user_id: &str) -> Result<SyncOutcome, SyncError> {
        match self.guard.check(user_id).await? {
            Ownership::Purged { removed } => {
                self.guard.claim(user_id).await?;
                let load = self.reload().await?;
                Ok(SyncOutcome::Purged { removed, load })
            }
            Ownership::Owned => Ok(SyncOutcome::Reloaded(self.reload().await?)),
            Ownership::Unclaimed | Ownership::OwnedAwaitingMigration => {
                self.migrate_local_progress(user_id).await
            }
        }
    }

    async fn migrate_local_progress(&self, user_id: &str) -> Result<SyncOutcome, SyncError> {
        let outcome = self.migration.run().await?;
        self.guard.claim(user_id).await?;
        self.guard
            .set_migration_pending(outcome == MigrationOutcome::Failed)
            .await?;

        match outcome {
            MigrationOutcome::NothingToMigrate => Ok(SyncOutcome::Reloaded(self.reload().await?)),
            MigrationOutcome::Imported { checklists } => {
                match self.reload().await {
                    Ok(load) => Ok(SyncOutcome::Migrated { checklists, load }),
                    Err(err) => {
                        tracing::warn!(error = %err, "reload after migration failed");
                        Ok(SyncOutcome::Migrated {
                            checklists,
                            load: LoadOutcome::Failed,
                        })
                    }
                }
            }
            MigrationOutcome::Failed => Ok(SyncOutcome::MigrationFailed(self.reload().await?)),
        }
    }

    /// Rebuild the whole state. Results of loads overtaken by a newer one are dropped.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if local storage fails.
    pub async fn reload(&self) -> Result<LoadOutcome, SyncError> {
        let seq = self.load_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let can_use_remote = self.auth()?.can_use_remote();

        let loaded = {
            let _loading = self.persister.begin_load();
            self.loader.load_all(can_use_remote).await?
        };

        if self.load_seq.load(Ordering::SeqCst) != seq {
            tracing::debug!(seq, "discarding superseded progress load");
            return Ok(LoadOutcome::Superseded);
        }
        *self.state.lock().map_err(|_| SyncError::StatePoisoned)? = loaded;
        Ok(LoadOutcome::Loaded)
    }

    //
    // ─── MUTATIONS ─────────────────────────────────────────────────────────────
    //

    /// Flip a plain item. Returns its new value.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if the cache mirror fails.
    pub async fn toggle_item(&self, cache_key: &str, item_key: &str) -> Result<bool, SyncError> {
        self.mutate(cache_key, |record| toggle::toggle_item(record, item_key))
            .await
    }

    /// First phase of toggling a topic; see `progress_core::toggle`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if the cache mirror fails.
    pub async fn request_completion(
        &self,
        cache_key: &str,
        topic: &Topic,
    ) -> Result<Completion, SyncError> {
        let request = toggle::request_completion(self.lock_state()?.record_mut(cache_key), topic);
        if matches!(request, CompletionRequest::Applied(_)) {
            self.persist_latest().await?;
        }

        Ok(match request {
            CompletionRequest::Applied(topic_state) => Completion::Applied(topic_state),
            CompletionRequest::NeedsDecision(pending) => {
                Completion::NeedsDecision(PendingDecision {
                    cache_key: cache_key.to_owned(),
                    pending,
                })
            }
        })
    }

    /// Second phase: complete the topic, cascading to its resources if asked.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if the cache mirror fails.
    pub async fn resolve_completion(
        &self,
        decision: PendingDecision,
        cascade: bool,
    ) -> Result<TopicState, SyncError> {
        let PendingDecision { cache_key, pending } = decision;
        self.mutate(&cache_key, |record| {
            toggle::resolve_completion(record, pending, CascadeChoice::from_cascade(cascade))
        })
        .await
    }

    /// Flip one resource and recompute its topic.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Checklist` if the resource is not listed on the topic,
    /// or `SyncError` if the cache mirror fails.
    pub async fn toggle_resource(
        &self,
        cache_key: &str,
        topic: &Topic,
        resource: &ResourceKey,
    ) -> Result<ResourceToggle, SyncError> {
        let toggled =
            toggle::toggle_resource(self.lock_state()?.record_mut(cache_key), topic, resource)?;
        self.persist_latest().await?;
        Ok(toggled)
    }

    async fn mutate<R>(
        &self,
        cache_key: &str,
        apply: impl FnOnce(&mut ProgressRecord) -> R,
    ) -> Result<R, SyncError> {
        let result = apply(self.lock_state()?.record_mut(cache_key));
        self.persist_latest().await?;
        Ok(result)
    }

    /// Mirror the current state and re-arm the batched write.
    ///
    /// The snapshot is taken under `persist_lock`, so of two racing
    /// mutations the one observed last carries both changes.
    async fn persist_latest(&self) -> Result<(), SyncError> {
        let _persisting = self.persist_lock.lock().await;
        let snapshot = self.snapshot()?;
        self.persister.observe(&snapshot).await?;
        Ok(())
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, ProgressState>, SyncError> {
        self.state.lock().map_err(|_| SyncError::StatePoisoned)
    }

    //
    // ─── PER-CHECKLIST ACTIONS ─────────────────────────────────────────────────
    //

    /// Clear one checklist locally and, for verified users, remotely.
    ///
    /// Any armed batch is replaced by one built from the cleared state, so
    /// the reset checklist is not uploaded again.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if the cache entry cannot be removed.
    pub async fn reset_checklist(&self, cache_key: &str) -> Result<(), SyncError> {
        self.persister.cancel();
        self.cache.remove(cache_key).await?;
        self.lock_state()?.insert(cache_key, ProgressRecord::new());
        self.persist_latest().await?;

        if self.auth()?.can_use_remote() {
            let checklist = ChecklistId::from_cache_key(cache_key);
            if let Err(err) = self.api.reset(&checklist).await {
                tracing::warn!(checklist = %checklist, error = %err, "remote reset failed");
            }
        }
        Ok(())
    }

    /// Re-fetch one checklist from the remote store (verified users only).
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if the local cache cannot be read or written.
    pub async fn refresh_checklist(&self, cache_key: &str) -> Result<ProgressRecord, SyncError> {
        if !self.auth()?.can_use_remote() {
            return self.record(cache_key);
        }
        let record = self.loader.load_one(cache_key).await?;
        self.state
            .lock()
            .map_err(|_| SyncError::StatePoisoned)?
            .insert(cache_key, record.clone());
        Ok(record)
    }

    /// Drop every cached checklist and the owner tag, e.g. on logout.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if the cache cannot be purged.
    pub async fn clear_local_progress(&self) -> Result<usize, SyncError> {
        self.persister.cancel();
        let removed = self.guard.purge().await?;
        *self.state.lock().map_err(|_| SyncError::StatePoisoned)? = ProgressState::new();
        Ok(removed)
    }

    //
    // ─── QUERIES ───────────────────────────────────────────────────────────────
    //

    /// Copy of the current state.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::StatePoisoned` if the state lock is poisoned.
    pub fn snapshot(&self) -> Result<ProgressState, SyncError> {
        Ok(self
            .state
            .lock()
            .map_err(|_| SyncError::StatePoisoned)?
            .clone())
    }

    /// Copy of one checklist's record (empty if unknown).
    ///
    /// # Errors
    ///
    /// Returns `SyncError::StatePoisoned` if the state lock is poisoned.
    pub fn record(&self, cache_key: &str) -> Result<ProgressRecord, SyncError> {
        Ok(self
            .state
            .lock()
            .map_err(|_| SyncError::StatePoisoned)?
            .get(cache_key)
            .cloned()
            .unwrap_or_default())
    }

    /// Current authentication signal.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::StatePoisoned` if the auth lock is poisoned.
    pub fn auth(&self) -> Result<AuthStatus, SyncError> {
        Ok(self
            .auth
            .lock()
            .map_err(|_| SyncError::StatePoisoned)?
            .clone())
    }
}
