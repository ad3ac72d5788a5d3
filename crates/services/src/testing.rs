use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use progress_core::model::{ChecklistId, ChecklistPayload, ProgressRecord};

use crate::error::RemoteError;
use crate::remote::{ProgressApi, RemoteSnapshot};

/// In-memory remote store that records every call.
#[derive(Default)]
pub(crate) struct FakeApi {
    remote: Mutex<RemoteSnapshot>,
    failing: AtomicBool,
    loads: AtomicUsize,
    batches: Mutex<Vec<Vec<ChecklistPayload>>>,
    migrations: Mutex<Vec<Vec<ChecklistPayload>>>,
    resets: Mutex<Vec<ChecklistId>>,
}

impl FakeApi {
    pub(crate) fn with_record(self, cache_key: &str, record: ProgressRecord) -> Self {
        self.remote
            .lock()
            .unwrap()
            .insert(&ChecklistId::from_cache_key(cache_key), record);
        self
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub(crate) fn batches(&self) -> Vec<Vec<ChecklistPayload>> {
        self.batches.lock().unwrap().clone()
    }

    pub(crate) fn migrations(&self) -> Vec<Vec<ChecklistPayload>> {
        self.migrations.lock().unwrap().clone()
    }

    pub(crate) fn resets(&self) -> Vec<ChecklistId> {
        self.resets.lock().unwrap().clone()
    }

    pub(crate) fn remote_record(&self, cache_key: &str) -> Option<ProgressRecord> {
        self.remote
            .lock()
            .unwrap()
            .get(&ChecklistId::from_cache_key(cache_key))
            .cloned()
    }

    fn check(&self) -> Result<(), RemoteError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(RemoteError::Unavailable("offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ProgressApi for FakeApi {
    async fn load_all(&self) -> Result<RemoteSnapshot, RemoteError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.remote.lock().unwrap().clone())
    }

    async fn batch_update_all(&self, checklists: &[ChecklistPayload]) -> Result<(), RemoteError> {
        self.check()?;
        self.batches.lock().unwrap().push(checklists.to_vec());
        let mut remote = self.remote.lock().unwrap();
        for payload in checklists {
            remote.insert(&payload.checklist(), payload.items.clone());
        }
        Ok(())
    }

    async fn migrate_signup_progress(
        &self,
        checklists: &[ChecklistPayload],
    ) -> Result<(), RemoteError> {
        self.check()?;
        self.migrations.lock().unwrap().push(checklists.to_vec());
        let mut remote = self.remote.lock().unwrap();
        for payload in checklists {
            let checklist = payload.checklist();
            let mut merged = remote.get(&checklist).cloned().unwrap_or_default();
            for (key, done) in payload.items.iter() {
                merged.set(key, done);
            }
            remote.insert(&checklist, merged);
        }
        Ok(())
    }

    async fn get(&self, checklist: &ChecklistId) -> Result<ProgressRecord, RemoteError> {
        self.check()?;
        Ok(self
            .remote
            .lock()
            .unwrap()
            .get(checklist)
            .cloned()
            .unwrap_or_default())
    }

    async fn reset(&self, checklist: &ChecklistId) -> Result<(), RemoteError> {
        self.check()?;
        self.resets.lock().unwrap().push(checklist.clone());
        self.remote
            .lock()
            .unwrap()
            .insert(checklist, ProgressRecord::new());
        Ok(())
    }
}

pub(crate) fn record(pairs: &[(&str, bool)]) -> ProgressRecord {
    pairs
        .iter()
        .map(|(key, done)| ((*key).to_string(), *done))
        .collect()
}
