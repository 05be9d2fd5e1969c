use std::time::Duration;

use shotcraft_core::search::MAX_SEARCH_ATTEMPTS;

use crate::poller::PollConfig;

/// Default backend base URL for local development.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 150;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2500;
const DEFAULT_AUTH_REFRESH_SECS: u64 = 300;

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL including the API prefix.
    pub api_url: String,
    /// Bearer token sent on every request, if any.
    pub api_token: Option<String>,
    pub request_timeout: Duration,
    pub poll: PollConfig,
    /// Attempts per search request, first try included.
    pub search_max_attempts: u32,
    /// Interval between `/auth/status` checks.
    pub auth_refresh_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            poll: PollConfig::default(),
            search_max_attempts: MAX_SEARCH_ATTEMPTS,
            auth_refresh_interval: Duration::from_secs(DEFAULT_AUTH_REFRESH_SECS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                     |
    /// |------------------------|-----------------------------|
    /// | `SHOTCRAFT_API_URL`    | `http://localhost:8000/api` |
    /// | `SHOTCRAFT_API_TOKEN`  | --                          |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                        |
    /// | `POLL_MAX_ATTEMPTS`    | `150`                       |
    /// | `POLL_INTERVAL_MS`     | `2500`                      |
    /// | `SEARCH_MAX_ATTEMPTS`  | `3`                         |
    /// | `AUTH_REFRESH_SECS`    | `300`                       |
    ///
    /// Unparseable or zero values fall back to the default with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_url = lookup("SHOTCRAFT_API_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let api_token = lookup("SHOTCRAFT_API_TOKEN")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let request_timeout_secs =
            positive(&lookup, "REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS);
        let max_attempts = positive(&lookup, "POLL_MAX_ATTEMPTS", DEFAULT_POLL_MAX_ATTEMPTS);
        let interval_ms = positive(&lookup, "POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS);
        let search_max_attempts = positive(&lookup, "SEARCH_MAX_ATTEMPTS", MAX_SEARCH_ATTEMPTS);
        let auth_refresh_secs = positive(&lookup, "AUTH_REFRESH_SECS", DEFAULT_AUTH_REFRESH_SECS);

        Self {
            api_url,
            api_token,
            request_timeout: Duration::from_secs(request_timeout_secs),
            poll: PollConfig {
                max_attempts,
                interval: Duration::from_millis(interval_ms),
            },
            search_max_attempts,
            auth_refresh_interval: Duration::from_secs(auth_refresh_secs),
        }
    }
}

fn positive<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + PartialOrd + Default + Copy + std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => value,
        _ => {
            tracing::warn!(key, value = %raw, default = %default, "Invalid config value, using default");
            default
        }
    }
}
