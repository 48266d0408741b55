//! Client configuration.

use std::time::Duration;

use clipflow_models::OutputUrls;

use crate::error::{ClientError, ClientResult};

const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Connection settings for the session API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base address, e.g. `http://localhost:8000/api`
    pub api_url: String,
    /// Timeout applied to every API request
    pub request_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Timeout for the heartbeat request
    pub keepalive_timeout: Duration,
    /// Maximum wait for a single chunk while streaming a download
    pub download_read_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            keepalive_timeout: Duration::from_secs(5),
            download_read_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            api_url: std::env::var("CLIPFLOW_API_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.api_url),
            request_timeout: secs_from_env("CLIPFLOW_REQUEST_TIMEOUT_SECS")
                .unwrap_or(defaults.request_timeout),
            connect_timeout: secs_from_env("CLIPFLOW_CONNECT_TIMEOUT_SECS")
                .unwrap_or(defaults.connect_timeout),
            keepalive_timeout: secs_from_env("CLIPFLOW_KEEPALIVE_TIMEOUT_SECS")
                .unwrap_or(defaults.keepalive_timeout),
            download_read_timeout: secs_from_env("CLIPFLOW_DOWNLOAD_READ_TIMEOUT_SECS")
                .unwrap_or(defaults.download_read_timeout),
        }
    }

    /// Config pointing at a specific base address, other values default.
    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    /// Validated URL builder for the configured base address.
    pub fn urls(&self) -> ClientResult<OutputUrls> {
        OutputUrls::parse(&self.api_url).map_err(|e| ClientError::config(e.to_string()))
    }
}

fn secs_from_env(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}
