use std::env;
use std::time::Duration;

use progress_core::model::ChecklistCatalog;
use url::Url;

use crate::error::ConfigError;

/// Quiet period between the last change and the batched remote write.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(500);

const DEFAULT_LANGUAGES: &[&str] = &["python", "java", "cpp", "javascript"];

/// Where the remote progress store lives.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: Url,
    pub token: Option<String>,
}

/// Settings for `ProgressSyncService`.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// `None` keeps the engine local-only.
    pub api: Option<ApiConfig>,
    pub quiet_period: Duration,
    pub catalog: ChecklistCatalog,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api: None,
            quiet_period: DEFAULT_QUIET_PERIOD,
            catalog: ChecklistCatalog::new(
                DEFAULT_LANGUAGES.iter().map(|&lang| lang.to_owned()).collect(),
                Vec::new(),
            ),
        }
    }
}

impl SyncConfig {
    /// Reads `PROGRESS_API_URL`, `PROGRESS_API_TOKEN`, `PROGRESS_DEBOUNCE_MS`,
    /// `PROGRESS_LANGUAGES` and `PROGRESS_EXAMS`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the URL or debounce value cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the URL or debounce value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api = match lookup("PROGRESS_API_URL").filter(|raw| !raw.trim().is_empty()) {
            Some(raw) => {
                let base_url = Url::parse(raw.trim())
                    .map_err(|source| ConfigError::InvalidApiUrl { raw, source })?;
                let token = lookup("PROGRESS_API_TOKEN").filter(|t| !t.trim().is_empty());
                Some(ApiConfig { base_url, token })
            }
            None => None,
        };

        let quiet_period = match lookup("PROGRESS_DEBOUNCE_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidDebounce { raw })?,
            None => defaults.quiet_period,
        };

        let languages = lookup("PROGRESS_LANGUAGES")
            .map_or_else(|| defaults.catalog.languages().to_vec(), |raw| split_list(&raw));
        let exams = lookup("PROGRESS_EXAMS")
            .map_or_else(|| defaults.catalog.exams().to_vec(), |raw| split_list(&raw));

        Ok(Self {
            api,
            quiet_period,
            catalog: ChecklistCatalog::new(languages, exams),
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_are_local_only() {
        let config = SyncConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.api.is_none());
        assert_eq!(config.quiet_period, DEFAULT_QUIET_PERIOD);
        assert!(config.catalog.languages().contains(&"python".to_owned()));
    }

    #[test]
    fn reads_api_and_lists() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("PROGRESS_API_URL", "https://progress.example.com/api"),
            ("PROGRESS_API_TOKEN", "secret"),
            ("PROGRESS_DEBOUNCE_MS", "250"),
            ("PROGRESS_LANGUAGES", "rust, go,,"),
            ("PROGRESS_EXAMS", "gate"),
        ]))
        .unwrap();

        let api = config.api.unwrap();
        assert_eq!(api.base_url.as_str(), "https://progress.example.com/api");
        assert_eq!(api.token.as_deref(), Some("secret"));
        assert_eq!(config.quiet_period, Duration::from_millis(250));
        assert_eq!(config.catalog.languages(), ["rust", "go"]);
        assert_eq!(config.catalog.exams(), ["gate"]);
    }

    #[test]
    fn rejects_bad_values() {
        let err = SyncConfig::from_lookup(lookup(&[("PROGRESS_API_URL", "not a url")]));
        assert!(matches!(err, Err(ConfigError::InvalidApiUrl { .. })));

        let err = SyncConfig::from_lookup(lookup(&[("PROGRESS_DEBOUNCE_MS", "soon")]));
        assert!(matches!(err, Err(ConfigError::InvalidDebounce { .. })));
    }
}
