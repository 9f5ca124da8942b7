//! Bibliographic source adapters with a trait-based paging interface.
//!
//! Every API this crate can harvest from implements [`Source`]. The trait is
//! deliberately small: a source knows how to fetch one page for a cursor, how
//! to pull the hit count and the items out of that page, and how to find the
//! next cursor. The generic [`Paginator`](crate::harvest::Paginator) drives
//! the rest.
//!
//! On top of paging, a source knows how to identify its records and where
//! their assets (fulltext XML, PDF, supplementary files, mined terms) live.
//!
//! # Feature Flags
//!
//! Individual sources can be disabled at compile time using Cargo features:
//!
//! - `eupmc` - Enable EuropePMC (default: enabled)
//! - `arxiv` - Enable arXiv (default: enabled)
//! - `crossref` - Enable CrossRef (default: enabled)
//! - `ieee` - Enable IEEE Xplore (default: enabled, requires an API key at runtime)

#[cfg(feature = "source-arxiv")]
mod arxiv;
#[cfg(feature = "source-crossref")]
mod crossref;
#[cfg(feature = "source-eupmc")]
mod eupmc;
#[cfg(feature = "source-ieee")]
mod ieee;
mod registry;

pub mod mock;

pub use mock::MockSource;

#[cfg(feature = "source-arxiv")]
pub use arxiv::ArxivSource;
#[cfg(feature = "source-crossref")]
pub use crossref::CrossRefSource;
#[cfg(feature = "source-eupmc")]
pub use eupmc::EuropePmcSource;
#[cfg(feature = "source-ieee")]
pub use ieee::IeeeSource;

pub use registry::{SourceCapabilities, SourceRegistry};

use async_trait::async_trait;
use std::time::Duration;

use crate::models::{AssetKind, HarvestQuery, Identifier, Record};

/// A raw page response.
///
/// JSON sources hand back the decoded body unchanged; XML sources convert
/// their feed into an equivalent JSON shape first.
pub type PageResponse = serde_json::Value;

/// Position of the next page to request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// Opaque token handed out by the API (EuropePMC `cursorMark`, CrossRef `cursor`)
    Token(String),
    /// Numeric offset of the first item on the page
    Offset(usize),
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cursor::Token(token) => write!(f, "cursor {}", token),
            Cursor::Offset(offset) => write!(f, "offset {}", offset),
        }
    }
}

/// The Source trait defines the interface for all bibliographic sources.
///
/// # Implementing a New Source
///
/// 1. Implement `id`, `name`, `page_size`, `fetch_page`, `extract_total`,
///    `extract_items` and `identifier`
/// 2. Override `initial_cursor`/`next_cursor` for token-based paging
/// 3. Advertise asset kinds through `capabilities` and implement `asset_url`
/// 4. Add the source to `SourceRegistry::from_config()`
#[async_trait]
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this source, also the results file prefix (e.g. "eupmc")
    fn id(&self) -> &str;

    /// Human-readable name of this source
    fn name(&self) -> &str;

    /// Describe the capabilities of this source
    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::empty()
    }

    /// Whether this source can supply an asset kind
    fn supports(&self, kind: AssetKind) -> bool {
        self.capabilities()
            .contains(SourceCapabilities::for_asset(kind))
    }

    /// Check that the source has everything it needs before any request
    fn validate_config(&self) -> Result<(), SourceError> {
        Ok(())
    }

    // ========== PAGING ==========

    /// Number of items requested per page
    fn page_size(&self) -> usize;

    /// Pause between consecutive page requests
    fn page_delay(&self) -> Duration {
        Duration::ZERO
    }

    /// Cursor for the first page
    fn initial_cursor(&self) -> Cursor {
        Cursor::Offset(0)
    }

    /// Fetch one page of results
    async fn fetch_page(
        &self,
        query: &HarvestQuery,
        cursor: &Cursor,
    ) -> Result<PageResponse, SourceError>;

    /// Total hit count reported by the page, `None` if the field is missing
    fn extract_total(&self, page: &PageResponse) -> Option<u64>;

    /// Items on the page, `None` if the container structure is missing
    fn extract_items(&self, page: &PageResponse) -> Option<Vec<Record>>;

    /// Cursor for the page after `page`.
    ///
    /// Offset cursors advance by the page size. Token sources must override
    /// this; `None` means the source has nothing more to give.
    fn next_cursor(&self, _page: &PageResponse, current: &Cursor) -> Option<Cursor> {
        match current {
            Cursor::Offset(offset) => Some(Cursor::Offset(offset + self.page_size())),
            Cursor::Token(_) => None,
        }
    }

    /// Inspect the first page for API version drift
    fn check_api_version(&self, _page: &PageResponse) {}

    // ========== RECORDS ==========

    /// Stable identifier of a record
    fn identifier(&self, record: &Record) -> Identifier;

    /// URL of an asset for a record, if the record has one
    fn asset_url(&self, _record: &Record, _kind: AssetKind) -> Option<String> {
        None
    }

    /// File name an asset is saved under
    fn asset_filename(&self, kind: AssetKind) -> &'static str {
        kind.default_filename()
    }

    /// Fulltext HTML landing page for a record
    fn fulltext_html_url(&self, _record: &Record) -> Option<String> {
        None
    }
}

/// Errors that can occur when interacting with a source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Network or HTTP transport error
    #[error("Network error: {0}")]
    Network(String),

    /// The page request did not finish within its deadline
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Parsing error (XML, JSON)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid request parameters or missing configuration
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Rate limit exceeded, with the server's retry-after hint in seconds
    #[error("Rate limit exceeded")]
    RateLimit(Option<u64>),

    /// Server-side failure (5xx)
    #[error("Server error: HTTP {0}")]
    Server(u16),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// API error from the source
    #[error("API error: {0}")]
    Api(String),

    /// IO error (file system)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("Error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return SourceError::Timeout(std::time::Duration::ZERO);
        }
        match err.status() {
            Some(status) if status.is_server_error() => SourceError::Server(status.as_u16()),
            _ => SourceError::Network(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

impl From<quick_xml::Error> for SourceError {
    fn from(err: quick_xml::Error) -> Self {
        SourceError::Parse(format!("XML: {}", err))
    }
}

/// Read a string field, treating empty strings as absent
pub(crate) fn str_field<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
