//! Shared error types for the services crate.

use thiserror::Error;

use progress_core::ChecklistError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressApi` implementations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    #[error("remote progress store is not configured")]
    NotConfigured,
    #[error("remote progress request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("remote progress store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted by `ProgressSyncService` and its components.
///
/// Remote failures are absorbed by the components that call the remote
/// store; only local storage problems and caller mistakes surface here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error("progress state lock poisoned")]
    StatePoisoned,
    #[error(transparent)]
    Checklist(#[from] ChecklistError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while reading `SyncConfig` from the environment.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid PROGRESS_API_URL {raw}: {source}")]
    InvalidApiUrl {
        raw: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid PROGRESS_DEBOUNCE_MS value: {raw}")]
    InvalidDebounce { raw: String },
}

/// Errors emitted while bootstrapping the sync service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
