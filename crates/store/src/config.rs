//! Runtime configuration, read once from the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::sync_queue::RetryPolicy;

pub const DEFAULT_API_URL: &str = "http://localhost:3001/api";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(3_000);
pub const DEFAULT_REPROBE_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Configuration of the persistence/sync layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Base URL of the remote API, health is probed at `{api_url}/health`.
    pub api_url: String,
    /// Bearer token attached to every remote call.
    pub api_token: Option<String>,
    /// When false the layer runs local-only: nothing is pushed or queued.
    pub remote_enabled: bool,
    /// Bound on every remote request, health probe included.
    pub request_timeout: Duration,
    /// How often to re-probe the remote API while offline.
    pub reprobe_interval: Duration,
    /// Replay attempts before a queued mutation is dead-lettered.
    pub sync_max_attempts: u32,
    /// Write demo records into collections that have never been persisted.
    pub seed_demo: bool,
    /// Directory holding the SQLite store (OS data dir when unset).
    pub data_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            remote_enabled: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reprobe_interval: DEFAULT_REPROBE_INTERVAL,
            sync_max_attempts: DEFAULT_MAX_ATTEMPTS,
            seed_demo: false,
            data_dir: None,
        }
    }
}

impl StoreConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Unparseable values are logged and replaced by their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_url = var("CRM_API_URL").unwrap_or(defaults.api_url);
        let api_token = var("CRM_API_TOKEN");
        let remote_disabled = parse_or("CRM_REMOTE_DISABLED", var("CRM_REMOTE_DISABLED"), false, parse_flag);
        let request_timeout = parse_or(
            "CRM_REQUEST_TIMEOUT_MS",
            var("CRM_REQUEST_TIMEOUT_MS"),
            defaults.request_timeout,
            |v| v.parse::<u64>().ok().filter(|ms| *ms > 0).map(Duration::from_millis),
        );
        let reprobe_interval = parse_or(
            "CRM_REPROBE_INTERVAL_SECS",
            var("CRM_REPROBE_INTERVAL_SECS"),
            defaults.reprobe_interval,
            |v| v.parse::<u64>().ok().filter(|s| *s > 0).map(Duration::from_secs),
        );
        let sync_max_attempts = parse_or(
            "CRM_SYNC_MAX_ATTEMPTS",
            var("CRM_SYNC_MAX_ATTEMPTS"),
            defaults.sync_max_attempts,
            |v| v.parse::<u32>().ok().filter(|n| *n > 0),
        );
        let seed_demo = parse_or("CRM_SEED_DEMO", var("CRM_SEED_DEMO"), false, parse_flag);
        let data_dir = var("CRM_DATA_DIR").map(PathBuf::from);

        Self {
            api_url,
            api_token,
            remote_enabled: !remote_disabled,
            request_timeout,
            reprobe_interval,
            sync_max_attempts,
            seed_demo,
            data_dir,
        }
    }

    /// Configuration that never talks to a remote API.
    pub fn local_only() -> Self {
        Self {
            remote_enabled: false,
            ..Self::default()
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_seed_demo(mut self, seed_demo: bool) -> Self {
        self.seed_demo = seed_demo;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.sync_max_attempts,
            ..RetryPolicy::default()
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T, parse: impl Fn(&str) -> Option<T>) -> T {
    match raw {
        None => default,
        Some(value) => parse(&value).unwrap_or_else(|| {
            tracing::warn!("ignoring invalid {key}={value:?}, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = StoreConfig::from_lookup(|_| None);
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.api_url, "http://localhost:3001/api");
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.reprobe_interval, Duration::from_secs(300));
        assert!(config.remote_enabled);
    }

    #[test]
    fn reads_every_variable() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("CRM_API_URL", "https://crm.example.com/api"),
            ("CRM_API_TOKEN", "secret"),
            ("CRM_REMOTE_DISABLED", "true"),
            ("CRM_REQUEST_TIMEOUT_MS", "1500"),
            ("CRM_REPROBE_INTERVAL_SECS", "60"),
            ("CRM_SYNC_MAX_ATTEMPTS", "3"),
            ("CRM_SEED_DEMO", "yes"),
            ("CRM_DATA_DIR", "/tmp/crm"),
        ]));

        assert_eq!(config.api_url, "https://crm.example.com/api");
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert!(!config.remote_enabled);
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
        assert_eq!(config.reprobe_interval, Duration::from_secs(60));
        assert_eq!(config.retry_policy().max_attempts, 3);
        assert!(config.seed_demo);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/crm")));
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("CRM_REQUEST_TIMEOUT_MS", "soon"),
            ("CRM_SYNC_MAX_ATTEMPTS", "0"),
            ("CRM_REMOTE_DISABLED", "maybe"),
            ("CRM_API_TOKEN", "   "),
        ]));
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.sync_max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(config.remote_enabled);
        assert_eq!(config.api_token, None);
    }
}
