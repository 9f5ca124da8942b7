//! Configuration management.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `GETPAPERS__SECTION__KEY` environment variables.
//!
//! ```toml
//! [http]
//! user_agent = "getpapers/0.2 (mailto:me@example.org)"
//!
//! [download]
//! workers = 4
//!
//! [pagination]
//! page_timeout_secs = 120
//!
//! [api_keys]
//! ieee = "..."
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::harvest::PaginatorSettings;
use crate::sources::SourceError;
use crate::utils::{HttpClient, RetryConfig, DEFAULT_USER_AGENT};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "GETPAPERS";

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Outbound HTTP settings
    pub http: HttpConfig,

    /// Asset download settings
    pub download: DownloadConfig,

    /// Metadata paging settings
    pub pagination: PaginationConfig,

    /// API keys for sources that need them
    pub api_keys: ApiKeys,
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Whole-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// Backoff settings as they appear in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_total_time_secs: u64,
}

impl RetrySettings {
    /// Convert into the runtime retry configuration
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            max_total_time: Duration::from_secs(self.max_total_time_secs),
        }
    }
}

/// Asset download settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Number of concurrent download workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Retry policy for failed downloads
    #[serde(default = "default_download_retry")]
    pub retry: RetrySettings,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            retry: default_download_retry(),
        }
    }
}

fn default_workers() -> usize {
    10
}

fn default_download_retry() -> RetrySettings {
    RetrySettings {
        max_attempts: 3,
        initial_delay_ms: 1000,
        max_delay_ms: 30_000,
        backoff_multiplier: 2.0,
        max_total_time_secs: 90,
    }
}

/// Metadata paging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Deadline for a single page request in seconds
    #[serde(default = "default_page_timeout_secs")]
    pub page_timeout_secs: u64,

    /// Retry policy for timed out or failed page requests
    #[serde(default = "default_page_retry")]
    pub retry: RetrySettings,

    /// Pause before re-requesting a malformed page, in milliseconds
    #[serde(default = "default_malformed_retry_delay_ms")]
    pub malformed_retry_delay_ms: u64,

    /// Malformed responses tolerated for one page before giving up
    #[serde(default = "default_max_malformed_attempts")]
    pub max_malformed_attempts: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_timeout_secs: default_page_timeout_secs(),
            retry: default_page_retry(),
            malformed_retry_delay_ms: default_malformed_retry_delay_ms(),
            max_malformed_attempts: default_max_malformed_attempts(),
        }
    }
}

fn default_page_timeout_secs() -> u64 {
    120
}

fn default_page_retry() -> RetrySettings {
    RetrySettings {
        max_attempts: 5,
        initial_delay_ms: 2000,
        max_delay_ms: 120_000,
        backoff_multiplier: 2.0,
        max_total_time_secs: 300,
    }
}

fn default_malformed_retry_delay_ms() -> u64 {
    3000
}

fn default_max_malformed_attempts() -> u32 {
    10
}

/// API keys for external services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeys {
    /// IEEE Xplore API key
    #[serde(default = "default_ieee_key")]
    pub ieee: Option<String>,
}

impl Default for ApiKeys {
    fn default() -> Self {
        Self {
            ieee: default_ieee_key(),
        }
    }
}

fn default_ieee_key() -> Option<String> {
    std::env::var("IEEE_XPLORE_API_KEY").ok()
}

impl HarvestConfig {
    /// Reject settings the harvester cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.download.workers == 0 {
            return Err(ConfigError::Invalid(
                "download.workers must be at least 1".to_string(),
            ));
        }
        if self.pagination.max_malformed_attempts == 0 {
            return Err(ConfigError::Invalid(
                "pagination.max_malformed_attempts must be at least 1".to_string(),
            ));
        }
        for (name, retry) in [
            ("download.retry", &self.download.retry),
            ("pagination.retry", &self.pagination.retry),
        ] {
            if retry.max_attempts == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{}.max_attempts must be at least 1",
                    name
                )));
            }
        }
        if self.http.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "http.user_agent must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the shared HTTP client
    pub fn http_client(&self) -> Result<HttpClient, SourceError> {
        HttpClient::with_options(
            &self.http.user_agent,
            Duration::from_secs(self.http.timeout_secs),
            Duration::from_secs(self.http.connect_timeout_secs),
        )
    }

    /// Paging behaviour for the paginator
    pub fn paginator_settings(&self) -> PaginatorSettings {
        PaginatorSettings {
            page_timeout: Duration::from_secs(self.pagination.page_timeout_secs),
            retry: self.pagination.retry.to_retry_config(),
            malformed_retry_delay: Duration::from_millis(self.pagination.malformed_retry_delay_ms),
            max_malformed_attempts: self.pagination.max_malformed_attempts,
        }
    }

    /// Retry policy for asset downloads
    pub fn download_retry(&self) -> RetryConfig {
        self.download.retry.to_retry_config()
    }
}

/// Load configuration from an optional file layered with the environment
pub fn load_config(path: Option<&Path>) -> Result<HarvestConfig, ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: HarvestConfig = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

/// Find a config file in the default locations
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("getpapers.toml");
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("getpapers").join("config.toml"))
        .filter(|path| path.is_file())
}
