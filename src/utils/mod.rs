//! Utility modules supporting harvest operations.
//!
//! - [`HttpClient`]: shared reqwest client carrying the configured User-Agent
//! - [`RetryConfig`] and [`with_retry`]: exponential backoff for transient errors
//! - [`sanitize_path_component`]: filesystem-safe names for identifiers
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use getpapers::sources::SourceError;
//! use getpapers::utils::{with_retry, HttpClient, RetryConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), SourceError> {
//! let client = HttpClient::new()?;
//! let body = with_retry(RetryConfig::default(), || async {
//!     client.get_text("https://api.crossref.org/works", &[("rows", "1".to_string())]).await
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

mod http;
mod retry;
mod sanitize;

pub use http::{check_status, HttpClient, DEFAULT_USER_AGENT};
pub use retry::{
    api_retry_config, download_retry_config, with_retry, RetryConfig, Transient, TransientError,
};
pub use sanitize::{sanitize_path_component, validate_download_url, ValidationError};
