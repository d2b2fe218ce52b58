//! Configuration types for coursegen-client
//!
//! Every tunable of the polling engine, the request executor and the download
//! manager lives here as a defaulted field, so a deployment can override any of
//! them from JSON without touching code. Durations are expressed in milliseconds
//! on the wire.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remote API location and shared HTTP settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the backend, without the API prefix (default: "http://localhost:8000")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Leading path segment every API route lives under (default: "/api")
    ///
    /// Stripped from request paths before deduplication, re-added when the
    /// request goes on the wire.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Per-request timeout for non-streaming calls (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_ms_serde")]
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_prefix: default_api_prefix(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Throttle, deduplication and retry policy of the request executor
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Retries after the first attempt (default: 3, so up to 4 tries)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between attempts (default: 1000 ms)
    #[serde(default = "default_retry_delay", with = "duration_ms_serde")]
    pub retry_delay: Duration,

    /// Minimum time between two fresh calls to the same key (default: 1000 ms)
    #[serde(default = "default_throttle_window", with = "duration_ms_serde")]
    pub throttle_window: Duration,

    /// Quiet period the debounced variant waits for before executing (default: 300 ms)
    #[serde(default = "default_debounce_delay", with = "duration_ms_serde")]
    pub debounce_delay: Duration,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            throttle_window: default_throttle_window(),
            debounce_delay: default_debounce_delay(),
        }
    }
}

/// Timing of the task-completion polling loop
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Grace delay before the first status check (default: 1000 ms)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Interval between status checks (default: 2000 ms)
    #[serde(default = "default_poll_interval", with = "duration_ms_serde")]
    pub poll_interval: Duration,

    /// Absolute bound on one polling loop, measured from loop start (default: 300000 ms)
    #[serde(default = "default_safety_timeout", with = "duration_ms_serde")]
    pub safety_timeout: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            poll_interval: default_poll_interval(),
            safety_timeout: default_safety_timeout(),
        }
    }
}

/// Streaming download settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Abort deadline for a whole transfer (default: 180000 ms)
    #[serde(default = "default_download_timeout", with = "duration_ms_serde")]
    pub timeout: Duration,

    /// Prefix relative artifact URLs are routed through (default: "/api")
    #[serde(default = "default_proxy_prefix")]
    pub proxy_prefix: String,

    /// Filename used when neither the caller nor the server provides one (default: "download")
    #[serde(default = "default_filename")]
    pub default_filename: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout: default_download_timeout(),
            proxy_prefix: default_proxy_prefix(),
            default_filename: default_filename(),
        }
    }
}

/// Main configuration for coursegen-client
///
/// All sections are optional when deserializing; missing values take the
/// defaults documented on each field.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend location and shared HTTP settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Request executor policy
    #[serde(default)]
    pub requests: RequestConfig,

    /// Polling loop timing
    #[serde(default)]
    pub polling: PollingConfig,

    /// Download manager settings
    #[serde(default)]
    pub download: DownloadConfig,
}

impl Config {
    /// Create a default configuration pointing at `base_url`
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            api: ApiConfig {
                base_url: base_url.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Check the configuration for values the components cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(Error::config("api.base_url", "base URL must not be empty"));
        }
        url::Url::parse(&self.api.base_url).map_err(|e| {
            Error::config("api.base_url", format!("invalid base URL '{}': {e}", self.api.base_url))
        })?;

        if self.polling.poll_interval.is_zero() {
            return Err(Error::config(
                "polling.poll_interval",
                "poll interval must be greater than zero",
            ));
        }
        if self.polling.safety_timeout <= self.polling.initial_delay {
            return Err(Error::config(
                "polling.safety_timeout",
                "safety timeout must be longer than the initial delay",
            ));
        }
        if self.download.timeout.is_zero() {
            return Err(Error::config(
                "download.timeout",
                "download timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_api_prefix() -> String {
    "/api".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_throttle_window() -> Duration {
    Duration::from_millis(1000)
}

fn default_debounce_delay() -> Duration {
    Duration::from_millis(300)
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(2000)
}

fn default_safety_timeout() -> Duration {
    Duration::from_millis(300_000)
}

fn default_download_timeout() -> Duration {
    Duration::from_millis(180_000)
}

fn default_proxy_prefix() -> String {
    "/api".to_string()
}

fn default_filename() -> String {
    "download".to_string()
}

// Duration serialization helper (milliseconds)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
