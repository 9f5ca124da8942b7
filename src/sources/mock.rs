//! Scripted source for testing the paging and download machinery.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::models::{AssetKind, HarvestQuery, IdKind, Identifier, Record};
use crate::sources::{
    str_field, Cursor, PageResponse, Source, SourceCapabilities, SourceError,
};

/// A source that replays scripted page responses and records every cursor it
/// was asked for.
///
/// Pages look like `{"total": n, "items": [...], "next": "token"}`; items
/// carry their identifier in `id` and asset URLs under `assets.<kind>`.
#[derive(Debug)]
pub struct MockSource {
    page_size: usize,
    capabilities: SourceCapabilities,
    pages: Mutex<VecDeque<Result<PageResponse, SourceError>>>,
    calls: Mutex<Vec<Cursor>>,
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl MockSource {
    /// Create a mock source with the given page size
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            capabilities: SourceCapabilities::all(),
            pages: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Restrict the advertised capabilities
    pub fn with_capabilities(mut self, capabilities: SourceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Queue a successful page
    pub fn push_page(&self, page: PageResponse) -> &Self {
        self.push_result(Ok(page))
    }

    /// Queue a failed fetch
    pub fn push_error(&self, error: SourceError) -> &Self {
        self.push_result(Err(error))
    }

    fn push_result(&self, result: Result<PageResponse, SourceError>) -> &Self {
        self.pages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(result);
        self
    }

    /// Cursors requested so far, in order
    pub fn calls(&self) -> Vec<Cursor> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of page fetches so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Build a page holding records `first..first + count`
    pub fn page(total: u64, first: usize, count: usize) -> PageResponse {
        let items: Vec<Value> = (first..first + count).map(Self::record).collect();
        json!({ "total": total, "items": items })
    }

    /// A record whose identifier is `rec-<n>` and which links every asset kind
    pub fn record(n: usize) -> Record {
        json!({
            "id": format!("rec-{}", n),
            "title": format!("Record {}", n),
            "assets": {
                "xml": format!("http://mock/{}/xml", n),
                "pdf": format!("http://mock/{}/pdf", n),
                "supplementary": format!("http://mock/{}/supp", n),
                "minedterms": format!("http://mock/{}/terms", n)
            }
        })
    }
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> &str {
        "mock"
    }

    fn name(&self) -> &str {
        "Mock Source"
    }

    fn capabilities(&self) -> SourceCapabilities {
        self.capabilities
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    async fn fetch_page(
        &self,
        _query: &HarvestQuery,
        cursor: &Cursor,
    ) -> Result<PageResponse, SourceError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(cursor.clone());

        self.pages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(SourceError::Other("no scripted page left".to_string())))
    }

    fn extract_total(&self, page: &PageResponse) -> Option<u64> {
        page.get("total").and_then(|v| v.as_u64())
    }

    fn extract_items(&self, page: &PageResponse) -> Option<Vec<Record>> {
        page.get("items").and_then(|v| v.as_array()).cloned()
    }

    fn next_cursor(&self, page: &PageResponse, current: &Cursor) -> Option<Cursor> {
        if let Some(next) = page.get("next") {
            return next.as_str().map(|token| Cursor::Token(token.to_string()));
        }
        match current {
            Cursor::Offset(offset) => Some(Cursor::Offset(offset + self.page_size)),
            Cursor::Token(_) => None,
        }
    }

    fn identifier(&self, record: &Record) -> Identifier {
        Identifier::first_of(record, &[(IdKind::Pmcid, "id"), (IdKind::Title, "title")])
    }

    fn asset_url(&self, record: &Record, kind: AssetKind) -> Option<String> {
        let key = match kind {
            AssetKind::Xml => "xml",
            AssetKind::Pdf => "pdf",
            AssetKind::Supplementary => "supplementary",
            AssetKind::MinedTerms => "minedterms",
        };
        record
            .get("assets")
            .and_then(|assets| str_field(assets, key))
            .map(str::to_string)
    }

    fn fulltext_html_url(&self, record: &Record) -> Option<String> {
        str_field(record, "html").map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_replays_pages_in_order() {
        let source = MockSource::new(2);
        source
            .push_page(MockSource::page(3, 0, 2))
            .push_error(SourceError::Network("down".into()));

        let query = HarvestQuery::new("q");
        let first = source.fetch_page(&query, &Cursor::Offset(0)).await.unwrap();
        assert_eq!(source.extract_items(&first).unwrap().len(), 2);

        let second = source.fetch_page(&query, &Cursor::Offset(2)).await;
        assert!(matches!(second, Err(SourceError::Network(_))));

        let exhausted = source.fetch_page(&query, &Cursor::Offset(4)).await;
        assert!(matches!(exhausted, Err(SourceError::Other(_))));

        assert_eq!(
            source.calls(),
            vec![Cursor::Offset(0), Cursor::Offset(2), Cursor::Offset(4)]
        );
    }

    #[test]
    fn test_mock_records() {
        let source = MockSource::default();
        let record = MockSource::record(7);
        assert_eq!(source.identifier(&record).id, "rec-7");
        assert_eq!(
            source.asset_url(&record, AssetKind::MinedTerms).as_deref(),
            Some("http://mock/7/terms")
        );
    }
}
