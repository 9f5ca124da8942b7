//! arXiv source implementation.
//!
//! The arXiv API answers with an Atom feed. Pages are requested by offset
//! and the API asks clients to leave a few seconds between calls.

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::models::{AssetKind, HarvestQuery, IdKind, Identifier, Record};
use crate::sources::{
    str_field, Cursor, PageResponse, Source, SourceCapabilities, SourceError,
};
use crate::utils::HttpClient;

/// Base URL for arXiv API
const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";

/// Results requested per page
const PAGE_SIZE: usize = 500;

/// Pause between page requests
const PAGE_DELAY: Duration = Duration::from_millis(3000);

/// Entry fields kept as plain text
const TEXT_FIELDS: &[&str] = &[
    "id",
    "title",
    "summary",
    "published",
    "updated",
    "doi",
    "journal_ref",
    "comment",
];

/// arXiv source
#[derive(Debug, Clone)]
pub struct ArxivSource {
    client: HttpClient,
    api_url: String,
    page_delay: Duration,
}

impl ArxivSource {
    /// Create a new arXiv source
    pub fn new() -> Result<Self, SourceError> {
        Ok(Self::with_client(HttpClient::new()?))
    }

    /// Create with a shared HTTP client
    pub fn with_client(client: HttpClient) -> Self {
        Self {
            client,
            api_url: ARXIV_API_URL.to_string(),
            page_delay: PAGE_DELAY,
        }
    }

    /// Point the source at a different endpoint (for testing)
    pub fn with_base_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Override the pause between pages (for testing)
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Convert an Atom feed into `{"totalResults": n, "entries": [...]}`.
    ///
    /// `entries` is left out when the feed has none, which the paginator
    /// treats as a malformed page.
    pub fn parse_feed(xml: &str) -> Result<PageResponse, SourceError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut saw_feed = false;
        let mut total: Option<u64> = None;
        let mut entries: Vec<Value> = Vec::new();
        let mut entry: Option<Map<String, Value>> = None;
        let mut in_author = false;
        let mut field: Option<String> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = local_name(&e);
                    match name.as_str() {
                        "feed" => saw_feed = true,
                        "entry" => entry = Some(Map::new()),
                        "author" => in_author = entry.is_some(),
                        _ => {}
                    }
                    if let Some(entry) = entry.as_mut() {
                        push_attribute_element(entry, &name, &e);
                    }
                    field = Some(name);
                }
                Ok(Event::Empty(e)) => {
                    if let Some(entry) = entry.as_mut() {
                        push_attribute_element(entry, &local_name(&e), &e);
                    }
                }
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| SourceError::Parse(format!("arXiv XML text: {}", e)))?;
                    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

                    match (entry.as_mut(), field.as_deref()) {
                        (None, Some("totalResults")) => total = text.parse().ok(),
                        (Some(entry), Some("name")) if in_author => {
                            push_array(entry, "authors", Value::String(text));
                        }
                        (Some(entry), Some(name)) if TEXT_FIELDS.contains(&name) => {
                            entry.insert(name.to_string(), Value::String(text));
                        }
                        _ => {}
                    }
                }
                Ok(Event::End(e)) => {
                    match e.local_name().as_ref() {
                        b"entry" => {
                            if let Some(done) = entry.take() {
                                entries.push(Value::Object(done));
                            }
                        }
                        b"author" => in_author = false,
                        _ => {}
                    }
                    field = None;
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(SourceError::Parse(format!(
                        "arXiv XML error at position {}: {}",
                        reader.error_position(),
                        e
                    )));
                }
            }
        }

        if !saw_feed {
            return Err(SourceError::Parse("no Atom feed in arXiv response".to_string()));
        }

        // the API reports query errors as a single feed entry
        if let Some(error) = entries
            .iter()
            .find(|e| str_field(e, "id").is_some_and(|id| id.contains("/api/errors")))
        {
            return Err(SourceError::Api(format!(
                "arXiv rejected the query: {}",
                str_field(error, "summary").unwrap_or("unknown error")
            )));
        }

        let mut page = Map::new();
        if let Some(total) = total {
            page.insert("totalResults".to_string(), Value::from(total));
        }
        if !entries.is_empty() {
            page.insert("entries".to_string(), Value::Array(entries));
        }
        Ok(Value::Object(page))
    }

    /// The arXiv id, i.e. everything after `abs/` in the entry id URL
    fn arxiv_id(record: &Record) -> Option<&str> {
        str_field(record, "id")
            .and_then(|id| id.split_once("abs/"))
            .map(|(_, id)| id)
            .filter(|id| !id.is_empty())
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attributes(e: &BytesStart<'_>) -> Map<String, Value> {
    e.attributes()
        .flatten()
        .filter_map(|attr| {
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value().ok()?.into_owned();
            Some((key, Value::String(value)))
        })
        .collect()
}

/// Record the attribute-only elements of an entry
fn push_attribute_element(entry: &mut Map<String, Value>, name: &str, e: &BytesStart<'_>) {
    match name {
        "link" => push_array(entry, "links", Value::Object(attributes(e))),
        "category" => {
            if let Some(term) = attributes(e).remove("term") {
                push_array(entry, "categories", term);
            }
        }
        "primary_category" => {
            if let Some(term) = attributes(e).remove("term") {
                entry.insert("primary_category".to_string(), term);
            }
        }
        _ => {}
    }
}

fn push_array(entry: &mut Map<String, Value>, key: &str, value: Value) {
    match entry
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()))
    {
        Value::Array(values) => values.push(value),
        other => *other = Value::Array(vec![value]),
    }
}

#[async_trait]
impl Source for ArxivSource {
    fn id(&self) -> &str {
        "arxiv"
    }

    fn name(&self) -> &str {
        "arXiv"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::PDF | SourceCapabilities::SUPPLEMENTARY
    }

    fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    fn page_delay(&self) -> Duration {
        self.page_delay
    }

    async fn fetch_page(
        &self,
        query: &HarvestQuery,
        cursor: &Cursor,
    ) -> Result<PageResponse, SourceError> {
        let start = match cursor {
            Cursor::Offset(offset) => *offset,
            Cursor::Token(_) => {
                return Err(SourceError::InvalidRequest(
                    "arXiv pages by offset".to_string(),
                ))
            }
        };

        let params = [
            ("search_query", query.query.clone()),
            ("start", start.to_string()),
            ("max_results", PAGE_SIZE.to_string()),
        ];
        let body = self.client.get_text(&self.api_url, &params).await?;

        Self::parse_feed(&body)
    }

    fn extract_total(&self, page: &PageResponse) -> Option<u64> {
        page.get("totalResults").and_then(|v| v.as_u64())
    }

    fn extract_items(&self, page: &PageResponse) -> Option<Vec<Record>> {
        page.get("entries").and_then(|v| v.as_array()).cloned()
    }

    fn identifier(&self, record: &Record) -> Identifier {
        match Self::arxiv_id(record) {
            Some(id) => Identifier::new(IdKind::Arxiv, id),
            None => Identifier::unknown(),
        }
    }

    fn asset_url(&self, record: &Record, kind: AssetKind) -> Option<String> {
        match kind {
            AssetKind::Pdf => record
                .get("links")
                .and_then(|v| v.as_array())?
                .iter()
                .find(|link| str_field(link, "type") == Some("application/pdf"))
                .and_then(|link| str_field(link, "href"))
                .map(str::to_string),
            AssetKind::Supplementary => {
                Self::arxiv_id(record)?;
                str_field(record, "id").map(|id| id.replacen("/abs/", "/e-print/", 1))
            }
            AssetKind::Xml | AssetKind::MinedTerms => None,
        }
    }

    fn asset_filename(&self, kind: AssetKind) -> &'static str {
        match kind {
            AssetKind::Supplementary => "supplementaryFiles.tar.gz",
            other => other.default_filename(),
        }
    }
}
