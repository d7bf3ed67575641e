//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the default constants for rate limiting, timeouts and retries.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sliding window for per-sender rate limiting (1 hour)
pub const RATE_WINDOW_SECS: u64 = 3600;
/// Maximum admitted messages per sender inside one window
pub const RATE_MAX_MESSAGES: usize = 5;

/// Default listen address for the webhook server
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
/// Messaging platform Graph API base (without trailing slash)
pub const DEFAULT_GRAPH_API_BASE: &str = "https://graph.facebook.com/v18.0";
/// Anonymous file host accepting `PUT /<file name>`
pub const DEFAULT_FILE_HOST_URL: &str = "https://transfer.sh";
/// Browser identification sent with page and media requests
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Timeout for page fetches, replies and other small requests
pub const HTTP_TIMEOUT_SECS: u64 = 30;
/// Timeout for a whole media download or upload
pub const TRANSFER_TIMEOUT_SECS: u64 = 300;

/// Retries after the first attempt for page fetch + media download
pub const FETCH_MAX_RETRIES: usize = 2;
/// Retries after the first attempt for file host uploads
pub const PUBLISH_MAX_RETRIES: usize = 2;
/// Retries after the first attempt for outbound replies
pub const REPLY_MAX_RETRIES: usize = 3;
/// Initial backoff between retries
pub const RETRY_INITIAL_BACKOFF_MS: u64 = 500;
/// Upper bound for a single backoff delay
pub const RETRY_MAX_BACKOFF_MS: u64 = 4000;

/// Application settings loaded from config files and environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Secret echoed back by the platform during the webhook handshake
    pub verify_token: String,
    /// Page access token used for outbound replies
    pub page_access_token: String,

    /// Address the webhook server listens on
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Graph API base URL for outbound replies
    #[serde(default = "default_graph_api_base")]
    pub graph_api_base: String,
    /// Anonymous file host endpoint
    #[serde(default = "default_file_host_url")]
    pub file_host_url: String,
    /// `User-Agent` header for page and media requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Rate limit window in seconds
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,
    /// Maximum admitted messages per window
    #[serde(default = "default_rate_max_messages")]
    pub rate_max_messages: usize,

    /// Per-request timeout for small requests
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Per-request timeout for media downloads and uploads
    #[serde(default = "default_transfer_timeout_secs")]
    pub transfer_timeout_secs: u64,

    /// Retries for page fetch and media download
    #[serde(default = "default_fetch_max_retries")]
    pub fetch_max_retries: usize,
    /// Retries for uploads to the file host
    #[serde(default = "default_publish_max_retries")]
    pub publish_max_retries: usize,
    /// Retries for outbound replies
    #[serde(default = "default_reply_max_retries")]
    pub reply_max_retries: usize,
    /// Initial retry backoff in milliseconds
    #[serde(default = "default_retry_initial_backoff_ms")]
    pub retry_initial_backoff_ms: u64,
    /// Maximum retry backoff in milliseconds
    #[serde(default = "default_retry_max_backoff_ms")]
    pub retry_max_backoff_ms: u64,
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

fn default_graph_api_base() -> String {
    DEFAULT_GRAPH_API_BASE.to_string()
}

fn default_file_host_url() -> String {
    DEFAULT_FILE_HOST_URL.to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

const fn default_rate_window_secs() -> u64 {
    RATE_WINDOW_SECS
}

const fn default_rate_max_messages() -> usize {
    RATE_MAX_MESSAGES
}

const fn default_http_timeout_secs() -> u64 {
    HTTP_TIMEOUT_SECS
}

const fn default_transfer_timeout_secs() -> u64 {
    TRANSFER_TIMEOUT_SECS
}

const fn default_fetch_max_retries() -> usize {
    FETCH_MAX_RETRIES
}

const fn default_publish_max_retries() -> usize {
    PUBLISH_MAX_RETRIES
}

const fn default_reply_max_retries() -> usize {
    REPLY_MAX_RETRIES
}

const fn default_retry_initial_backoff_ms() -> u64 {
    RETRY_INITIAL_BACKOFF_MS
}

const fn default_retry_max_backoff_ms() -> u64 {
    RETRY_MAX_BACKOFF_MS
}

/// Bounded exponential backoff settings for one kind of outbound call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 disables retrying)
    pub max_retries: usize,
    /// First backoff delay
    pub initial_backoff: Duration,
    /// Ceiling for any single delay
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_millis(0),
            max_backoff: Duration::from_millis(0),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: REPLY_MAX_RETRIES,
            initial_backoff: Duration::from_millis(RETRY_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(RETRY_MAX_BACKOFF_MS),
        }
    }
}

impl Settings {
    /// Create new settings by loading from config files and the environment
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use reel_relay::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required key is missing.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            // Eg.. `APP__RATE_MAX_MESSAGES=10 ./target/reel-relay`
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Plain UPPER_SNAKE_CASE variables, empty ones treated as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        s.try_deserialize()
    }

    /// Rate limit window as a `chrono` duration, saturating at `TimeDelta::MAX`
    #[must_use]
    pub fn rate_window(&self) -> chrono::TimeDelta {
        i64::try_from(self.rate_window_secs)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
            .unwrap_or(chrono::TimeDelta::MAX)
    }

    /// Timeout for page fetches and replies
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Timeout for media downloads and uploads
    #[must_use]
    pub const fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    /// Retry policy for the media fetcher
    #[must_use]
    pub const fn fetch_retry(&self) -> RetryPolicy {
        self.retry_policy(self.fetch_max_retries)
    }

    /// Retry policy for the file host upload
    #[must_use]
    pub const fn publish_retry(&self) -> RetryPolicy {
        self.retry_policy(self.publish_max_retries)
    }

    /// Retry policy for outbound replies
    #[must_use]
    pub const fn reply_retry(&self) -> RetryPolicy {
        self.retry_policy(self.reply_max_retries)
    }

    const fn retry_policy(&self, max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(self.retry_initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry_max_backoff_ms),
        }
    }
}
