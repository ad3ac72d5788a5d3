#![forbid(unsafe_code)]

pub mod app_services;
pub mod auth;
pub mod config;
pub mod error;
pub mod guard;
pub mod loader;
pub mod migration;
pub mod persister;
pub mod remote;
pub mod sync_service;

#[cfg(test)]
mod testing;

pub use app_services::AppServices;
pub use auth::AuthStatus;
pub use config::{ApiConfig, SyncConfig};
pub use error::{AppServicesError, ConfigError, RemoteError, SyncError};
pub use remote::{DisabledApi, HttpProgressApi, ProgressApi, RemoteSnapshot};
pub use sync_service::{
    Completion, LoadOutcome, PendingDecision, ProgressSyncService, SyncOutcome,
};
