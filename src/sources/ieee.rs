//! IEEE Xplore source implementation.
//!
//! Requires an API key, taken from `api_keys.ieee` or `IEEE_XPLORE_API_KEY`.
//! The API exposes metadata only, so the one extra it offers is a list of
//! fulltext HTML landing pages.

use async_trait::async_trait;
use serde_json::Value;

use crate::models::{HarvestQuery, IdKind, Identifier, Record};
use crate::sources::{
    str_field, Cursor, PageResponse, Source, SourceCapabilities, SourceError,
};
use crate::utils::HttpClient;

const IEEE_XPLORE_API_BASE: &str = "https://ieeexploreapi.ieee.org/api/v1/search/articles";

/// Largest page the API will serve
const PAGE_SIZE: usize = 200;

const ID_PRIORITY: &[(IdKind, &str)] = &[
    (IdKind::Doi, "doi"),
    (IdKind::ArticleNumber, "article_number"),
    (IdKind::Title, "title"),
];

/// IEEE Xplore source
#[derive(Debug, Clone)]
pub struct IeeeSource {
    client: HttpClient,
    api_url: String,
    api_key: Option<String>,
}

impl IeeeSource {
    /// Create a new IEEE source, reading the key from the environment
    pub fn new() -> Result<Self, SourceError> {
        Ok(Self::with_client(
            HttpClient::new()?,
            std::env::var("IEEE_XPLORE_API_KEY").ok(),
        ))
    }

    /// Create with a shared HTTP client and an optional API key
    pub fn with_client(client: HttpClient, api_key: Option<String>) -> Self {
        Self {
            client,
            api_url: IEEE_XPLORE_API_BASE.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    /// Point the source at a different endpoint (for testing)
    pub fn with_base_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn build_params(
        query: &HarvestQuery,
        start_record: usize,
        api_key: &str,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("querytext", query.query.clone()),
            ("max_records", PAGE_SIZE.to_string()),
            ("start_record", start_record.to_string()),
            ("format", "json".to_string()),
            ("apikey", api_key.to_string()),
        ];
        if !query.all {
            params.push(("open_access", "True".to_string()));
        }
        params
    }
}

#[async_trait]
impl Source for IeeeSource {
    fn id(&self) -> &str {
        "ieee"
    }

    fn name(&self) -> &str {
        "IEEE Xplore"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::HTML_URLS
    }

    fn validate_config(&self) -> Result<(), SourceError> {
        match self.api_key {
            Some(_) => Ok(()),
            None => Err(SourceError::InvalidRequest(
                "IEEE Xplore needs an API key (set api_keys.ieee or IEEE_XPLORE_API_KEY)"
                    .to_string(),
            )),
        }
    }

    fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    // start_record is 1-based
    fn initial_cursor(&self) -> Cursor {
        Cursor::Offset(1)
    }

    async fn fetch_page(
        &self,
        query: &HarvestQuery,
        cursor: &Cursor,
    ) -> Result<PageResponse, SourceError> {
        self.validate_config()?;
        let api_key = self.api_key.as_deref().unwrap_or_default();

        let start_record = match cursor {
            Cursor::Offset(offset) => *offset,
            Cursor::Token(_) => {
                return Err(SourceError::InvalidRequest(
                    "IEEE Xplore pages by record offset".to_string(),
                ))
            }
        };

        let body = self
            .client
            .get_text(
                &self.api_url,
                &Self::build_params(query, start_record, api_key),
            )
            .await?;

        serde_json::from_str(&body)
            .map_err(|e| SourceError::Parse(format!("Failed to parse IEEE JSON: {}", e)))
    }

    fn extract_total(&self, page: &PageResponse) -> Option<u64> {
        match page.get("total_records")? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn extract_items(&self, page: &PageResponse) -> Option<Vec<Record>> {
        match page.get("articles") {
            Some(Value::Array(articles)) => Some(articles.clone()),
            // the API drops the key on an empty page that still has a total
            None if page.get("total_records").is_some() => Some(Vec::new()),
            _ => None,
        }
    }

    fn identifier(&self, record: &Record) -> Identifier {
        Identifier::first_of(record, ID_PRIORITY)
    }

    fn fulltext_html_url(&self, record: &Record) -> Option<String> {
        str_field(record, "html_url").map(str::to_string)
    }
}
