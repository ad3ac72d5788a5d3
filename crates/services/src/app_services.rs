use std::sync::Arc;

use storage::repository::Storage;

use crate::config::SyncConfig;
use crate::error::AppServicesError;
use crate::remote::{DisabledApi, HttpProgressApi, ProgressApi};
use crate::sync_service::ProgressSyncService;

/// Assembles the sync engine over `SQLite` storage and the configured remote.
#[derive(Clone)]
pub struct AppServices {
    config: SyncConfig,
    sync: Arc<ProgressSyncService>,
}

impl AppServices {
    /// Build services from `SyncConfig::from_env`.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the environment is invalid or storage
    /// initialization fails.
    pub async fn from_env(db_url: &str) -> Result<Self, AppServicesError> {
        let config = SyncConfig::from_env()?;
        Self::new_sqlite(db_url, config).await
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, config: SyncConfig) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let api: Arc<dyn ProgressApi> = match &config.api {
            Some(api) => Arc::new(HttpProgressApi::new(api.clone())),
            None => {
                tracing::info!("PROGRESS_API_URL not set, progress stays local");
                Arc::new(DisabledApi)
            }
        };
        let sync = Arc::new(ProgressSyncService::new(&storage, api, &config));
        Ok(Self { config, sync })
    }

    #[must_use]
    pub fn sync(&self) -> Arc<ProgressSyncService> {
        Arc::clone(&self.sync)
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub fn remote_configured(&self) -> bool {
        self.config.api.is_some()
    }
}
