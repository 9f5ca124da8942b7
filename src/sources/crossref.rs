//! CrossRef source implementation.
//!
//! Uses the `/works` endpoint with deep-paging cursors. CrossRef only indexes
//! metadata; fulltext links are whatever publishers deposited in `link`.

use async_trait::async_trait;

use crate::models::{AssetKind, HarvestQuery, IdKind, Identifier, Record};
use crate::sources::{
    str_field, Cursor, PageResponse, Source, SourceCapabilities, SourceError,
};
use crate::utils::HttpClient;

/// Base URL for CrossRef API
const CROSSREF_API_URL: &str = "https://api.crossref.org/works";

/// Results requested per page
const PAGE_SIZE: usize = 1000;

/// CrossRef source
#[derive(Debug, Clone)]
pub struct CrossRefSource {
    client: HttpClient,
    api_url: String,
}

impl CrossRefSource {
    /// Create a new CrossRef source
    pub fn new() -> Result<Self, SourceError> {
        Ok(Self::with_client(HttpClient::new()?))
    }

    /// Create with a shared HTTP client
    pub fn with_client(client: HttpClient) -> Self {
        Self {
            client,
            api_url: CROSSREF_API_URL.to_string(),
        }
    }

    /// Point the source at a different endpoint (for testing)
    pub fn with_base_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn build_params(query: &HarvestQuery, cursor: &Cursor) -> Vec<(&'static str, String)> {
        let cursor = match cursor {
            Cursor::Token(token) => token.clone(),
            Cursor::Offset(_) => "*".to_string(),
        };

        let mut params = vec![("rows", PAGE_SIZE.to_string()), ("cursor", cursor)];
        if !query.query.trim().is_empty() {
            params.push(("query", query.query.clone()));
        }
        if !query.filters.is_empty() {
            let filter = query
                .filters
                .iter()
                .map(|(key, value)| format!("{}:{}", key, value))
                .collect::<Vec<_>>()
                .join(",");
            params.push(("filter", filter));
        }
        params
    }

    /// First deposited link with the given content type
    fn link_with_type(record: &Record, content_type: &str) -> Option<String> {
        record
            .get("link")
            .and_then(|v| v.as_array())?
            .iter()
            .find(|link| str_field(link, "content-type") == Some(content_type))
            .and_then(|link| str_field(link, "URL"))
            .map(str::to_string)
    }
}

#[async_trait]
impl Source for CrossRefSource {
    fn id(&self) -> &str {
        "crossref"
    }

    fn name(&self) -> &str {
        "CrossRef"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::XML | SourceCapabilities::PDF
    }

    fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    fn initial_cursor(&self) -> Cursor {
        Cursor::Token("*".to_string())
    }

    async fn fetch_page(
        &self,
        query: &HarvestQuery,
        cursor: &Cursor,
    ) -> Result<PageResponse, SourceError> {
        let body = self
            .client
            .get_text(&self.api_url, &Self::build_params(query, cursor))
            .await?;

        serde_json::from_str(&body)
            .map_err(|e| SourceError::Parse(format!("Failed to parse CrossRef JSON: {}", e)))
    }

    fn extract_total(&self, page: &PageResponse) -> Option<u64> {
        page.pointer("/message/total-results").and_then(|v| v.as_u64())
    }

    fn extract_items(&self, page: &PageResponse) -> Option<Vec<Record>> {
        page.pointer("/message/items")
            .and_then(|v| v.as_array())
            .cloned()
    }

    fn next_cursor(&self, page: &PageResponse, _current: &Cursor) -> Option<Cursor> {
        page.pointer("/message/next-cursor")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| Cursor::Token(s.to_string()))
    }

    fn identifier(&self, record: &Record) -> Identifier {
        Identifier::first_of(record, &[(IdKind::Doi, "DOI")])
    }

    fn asset_url(&self, record: &Record, kind: AssetKind) -> Option<String> {
        let content_type = match kind {
            AssetKind::Xml => "text/xml",
            AssetKind::Pdf => "application/pdf",
            AssetKind::Supplementary | AssetKind::MinedTerms => return None,
        };

        let url = Self::link_with_type(record, content_type);
        if url.is_none() {
            tracing::debug!(
                "Article with {} had no {} url",
                self.identifier(record),
                kind
            );
        }
        url
    }
}
