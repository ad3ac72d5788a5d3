use std::collections::BTreeMap;

use async_trait::async_trait;
use progress_core::model::{ChecklistId, ChecklistKind, ChecklistPayload, ProgressRecord};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use crate::config::ApiConfig;
use crate::error::RemoteError;

/// Whole-account progress as returned by one `load_all` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    #[serde(default)]
    pub language_dsa: BTreeMap<String, ProgressRecord>,
    #[serde(default)]
    pub language_dev: BTreeMap<String, ProgressRecord>,
    #[serde(default)]
    pub dsa_topics: BTreeMap<String, ProgressRecord>,
    #[serde(default)]
    pub examination: BTreeMap<String, ProgressRecord>,
}

impl RemoteSnapshot {
    fn family(&self, kind: ChecklistKind) -> &BTreeMap<String, ProgressRecord> {
        match kind {
            ChecklistKind::LanguageDsa => &self.language_dsa,
            ChecklistKind::LanguageDev => &self.language_dev,
            ChecklistKind::DsaTopics => &self.dsa_topics,
            ChecklistKind::Examination => &self.examination,
        }
    }

    fn family_mut(&mut self, kind: ChecklistKind) -> &mut BTreeMap<String, ProgressRecord> {
        match kind {
            ChecklistKind::LanguageDsa => &mut self.language_dsa,
            ChecklistKind::LanguageDev => &mut self.language_dev,
            ChecklistKind::DsaTopics => &mut self.dsa_topics,
            ChecklistKind::Examination => &mut self.examination,
        }
    }

    #[must_use]
    pub fn get(&self, checklist: &ChecklistId) -> Option<&ProgressRecord> {
        self.family(checklist.kind()).get(checklist.id())
    }

    pub fn insert(&mut self, checklist: &ChecklistId, record: ProgressRecord) {
        self.family_mut(checklist.kind())
            .insert(checklist.id().to_owned(), record);
    }

    /// Every checklist in the snapshot as `(cache_key, record)`.
    #[must_use]
    pub fn into_cache_entries(self) -> Vec<(String, ProgressRecord)> {
        let mut entries = Vec::new();
        for (kind, family) in [
            (ChecklistKind::LanguageDsa, self.language_dsa),
            (ChecklistKind::LanguageDev, self.language_dev),
            (ChecklistKind::DsaTopics, self.dsa_topics),
            (ChecklistKind::Examination, self.examination),
        ] {
            for (id, record) in family {
                entries.push((ChecklistId::new(kind, id).cache_key(), record));
            }
        }
        entries
    }
}

/// Remote, authoritative progress store.
#[async_trait]
pub trait ProgressApi: Send + Sync {
    /// Fetch every checklist of the signed-in user in one request.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` on transport, status or decode failures.
    async fn load_all(&self) -> Result<RemoteSnapshot, RemoteError>;

    /// Upsert all given checklists in one request.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` on transport or status failures.
    async fn batch_update_all(&self, checklists: &[ChecklistPayload]) -> Result<(), RemoteError>;

    /// One-time import of progress recorded before the account existed.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` on transport or status failures.
    async fn migrate_signup_progress(
        &self,
        checklists: &[ChecklistPayload],
    ) -> Result<(), RemoteError>;

    /// Fetch one checklist.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` on transport, status or decode failures.
    async fn get(&self, checklist: &ChecklistId) -> Result<ProgressRecord, RemoteError>;

    /// Delete all progress of one checklist.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` on transport or status failures.
    async fn reset(&self, checklist: &ChecklistId) -> Result<(), RemoteError>;
}

/// Stand-in used when no remote store is configured; every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledApi;

#[async_trait]
impl ProgressApi for DisabledApi {
    async fn load_all(&self) -> Result<RemoteSnapshot, RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    async fn batch_update_all(&self, _: &[ChecklistPayload]) -> Result<(), RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    async fn migrate_signup_progress(&self, _: &[ChecklistPayload]) -> Result<(), RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    async fn get(&self, _: &ChecklistId) -> Result<ProgressRecord, RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    async fn reset(&self, _: &ChecklistId) -> Result<(), RemoteError> {
        Err(RemoteError::NotConfigured)
    }
}

#[derive(Debug, Serialize)]
struct ChecklistBatch<'a> {
    checklists: &'a [ChecklistPayload],
}

/// JSON-over-HTTP client for the progress endpoints.
#[derive(Clone)]
pub struct HttpProgressApi {
    client: Client,
    config: ApiConfig,
}

impl HttpProgressApi {
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/progress/{path}",
            self.config.base_url.as_str().trim_end_matches('/')
        )
    }

    fn checklist_url(&self, checklist: &ChecklistId) -> String {
        self.url(&format!("{}/{}", checklist.kind(), checklist.id()))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let response = self.authorize(request).send().await?;
        if !response.status().is_success() {
            return Err(RemoteError::HttpStatus(response.status()));
        }
        Ok(response)
    }
}

#[async_trait]
impl ProgressApi for HttpProgressApi {
    async fn load_all(&self) -> Result<RemoteSnapshot, RemoteError> {
        let response = self.send(self.client.get(self.url("all"))).await?;
        Ok(response.json().await?)
    }

    async fn batch_update_all(&self, checklists: &[ChecklistPayload]) -> Result<(), RemoteError> {
        let body = ChecklistBatch { checklists };
        self.send(self.client.put(self.url("batch")).json(&body))
            .await?;
        Ok(())
    }

    async fn migrate_signup_progress(
        &self,
        checklists: &[ChecklistPayload],
    ) -> Result<(), RemoteError> {
        let body = ChecklistBatch { checklists };
        self.send(self.client.post(self.url("migrate")).json(&body))
            .await?;
        Ok(())
    }

    async fn get(&self, checklist: &ChecklistId) -> Result<ProgressRecord, RemoteError> {
        let response = self
            .send(self.client.get(self.checklist_url(checklist)))
            .await?;
        Ok(response.json().await?)
    }

    async fn reset(&self, checklist: &ChecklistId) -> Result<(), RemoteError> {
        self.send(self.client.delete(self.checklist_url(checklist)))
            .await?;
        Ok(())
    }
}
