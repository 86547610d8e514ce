//! Environment-driven orchestrator configuration.
//!
//! All knobs come from the process environment (loaded from `.env` by the
//! worker binary via dotenvy). Unset variables fall back to defaults;
//! malformed values are a startup error rather than a silent fallback.

use std::collections::HashMap;
use std::time::Duration;

use genflow_core::error::CoreError;
use genflow_core::retry::{
    clamp_max_retry_attempts, RetryClassifier, DEFAULT_CONTENT_FILTER_KEYWORDS,
    DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_TEMPORARY_KEYWORDS,
};

/// Default seconds between status poller ticks.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Default seconds between dispatch passes over pending generations.
const DEFAULT_DISPATCH_INTERVAL_SECS: u64 = 5;

/// Default per-request timeout for provider HTTP calls, in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Prefix for per-provider poll interval overrides, e.g.
/// `POLL_INTERVAL_SECS_DREAMFRAME=5`.
const POLL_OVERRIDE_PREFIX: &str = "POLL_INTERVAL_SECS_";

/// Runtime configuration for the worker and its loops.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub database_url: String,
    /// Default cap on automatic retries, applied to new generations that
    /// do not specify their own. Clamped to 1..=50.
    pub max_retry_attempts: i32,
    /// Default interval between status poller ticks.
    pub poll_interval: Duration,
    /// Per-provider poll interval overrides keyed by provider id.
    pub poll_interval_overrides: HashMap<String, Duration>,
    /// Interval between dispatch passes over pending generations.
    pub dispatch_interval: Duration,
    /// Bound on each provider HTTP request.
    pub request_timeout: Duration,
    pub content_filter_keywords: Vec<String>,
    pub temporary_error_keywords: Vec<String>,
}

impl OrchestratorConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, CoreError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| CoreError::Config("DATABASE_URL must be set".to_string()))?;

        let max_retry_attempts = clamp_max_retry_attempts(env_parse(
            "MAX_RETRY_ATTEMPTS",
            DEFAULT_MAX_RETRY_ATTEMPTS,
        )?);

        let poll_interval = Duration::from_secs(env_parse(
            "POLL_INTERVAL_SECS",
            DEFAULT_POLL_INTERVAL_SECS,
        )?);
        let dispatch_interval = Duration::from_secs(env_parse(
            "DISPATCH_INTERVAL_SECS",
            DEFAULT_DISPATCH_INTERVAL_SECS,
        )?);
        let request_timeout = Duration::from_secs(env_parse(
            "REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);

        let mut poll_interval_overrides = HashMap::new();
        for (key, value) in std::env::vars() {
            if let Some(provider_id) = provider_from_poll_key(&key) {
                let secs: u64 = value.parse().map_err(|_| {
                    CoreError::Config(format!("{key} must be an integer, got '{value}'"))
                })?;
                poll_interval_overrides.insert(provider_id, Duration::from_secs(secs));
            }
        }

        let content_filter_keywords = keyword_list(
            std::env::var("CONTENT_FILTER_KEYWORDS").ok().as_deref(),
            DEFAULT_CONTENT_FILTER_KEYWORDS,
        );
        let temporary_error_keywords = keyword_list(
            std::env::var("TEMPORARY_ERROR_KEYWORDS").ok().as_deref(),
            DEFAULT_TEMPORARY_KEYWORDS,
        );

        Ok(Self {
            database_url,
            max_retry_attempts,
            poll_interval,
            poll_interval_overrides,
            dispatch_interval,
            request_timeout,
            content_filter_keywords,
            temporary_error_keywords,
        })
    }

    /// The poll interval for a provider, honoring any override.
    pub fn poll_interval_for(&self, provider_id: &str) -> Duration {
        self.poll_interval_overrides
            .get(provider_id)
            .copied()
            .unwrap_or(self.poll_interval)
    }

    /// Build the failure classifier from the configured keyword lists.
    pub fn classifier(&self) -> RetryClassifier {
        RetryClassifier::new(
            self.content_filter_keywords.clone(),
            self.temporary_error_keywords.clone(),
        )
    }
}

/// Parse an optional environment variable, erroring on malformed values.
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, CoreError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| CoreError::Config(format!("{name} must be a number, got '{raw}'"))),
        Err(_) => Ok(default),
    }
}

/// Extract the provider id from a `POLL_INTERVAL_SECS_<PROVIDER>` key.
///
/// Provider ids are stored lowercase; environment keys are upper-cased by
/// convention, so `POLL_INTERVAL_SECS_DREAMFRAME` maps to `dreamframe`.
fn provider_from_poll_key(key: &str) -> Option<String> {
    let suffix = key.strip_prefix(POLL_OVERRIDE_PREFIX)?;
    if suffix.is_empty() {
        return None;
    }
    Some(suffix.to_lowercase())
}

/// Split a comma-separated keyword override, falling back to defaults
/// when the variable is unset or only whitespace.
fn keyword_list(raw: Option<&str>, defaults: &[&str]) -> Vec<String> {
    match raw {
        Some(s) if !s.trim().is_empty() => s
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect(),
        _ => defaults.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_override_key_parsing() {
        assert_eq!(
            provider_from_poll_key("POLL_INTERVAL_SECS_DREAMFRAME"),
            Some("dreamframe".to_string())
        );
        assert_eq!(provider_from_poll_key("POLL_INTERVAL_SECS"), None);
        assert_eq!(provider_from_poll_key("POLL_INTERVAL_SECS_"), None);
        assert_eq!(provider_from_poll_key("OTHER_VAR"), None);
    }

    #[test]
    fn keyword_list_splits_and_trims() {
        let list = keyword_list(Some("nsfw, flagged , "), &["default"]);
        assert_eq!(list, vec!["nsfw", "flagged"]);
    }

    #[test]
    fn keyword_list_falls_back_to_defaults() {
        assert_eq!(keyword_list(None, &["a", "b"]), vec!["a", "b"]);
        assert_eq!(keyword_list(Some("   "), &["a", "b"]), vec!["a", "b"]);
    }

    #[test]
    fn poll_interval_override_lookup() {
        let mut overrides = HashMap::new();
        overrides.insert("dreamframe".to_string(), Duration::from_secs(3));
        let config = OrchestratorConfig {
            database_url: String::new(),
            max_retry_attempts: 20,
            poll_interval: Duration::from_secs(10),
            poll_interval_overrides: overrides,
            dispatch_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            content_filter_keywords: Vec::new(),
            temporary_error_keywords: Vec::new(),
        };
        assert_eq!(config.poll_interval_for("dreamframe"), Duration::from_secs(3));
        assert_eq!(config.poll_interval_for("other"), Duration::from_secs(10));
    }
}
