//! EuropePMC source implementation using their REST API.
//!
//! EuropePMC indexes PubMed, PMC, and preprints. Paging uses `cursorMark`
//! tokens; fulltext XML, supplementary files and text-mined terms are served
//! from the same REST root keyed by PMCID.

use async_trait::async_trait;
use serde_json::Value;

use crate::models::{AssetKind, HarvestQuery, IdKind, Identifier, Record};
use crate::sources::{
    str_field, Cursor, PageResponse, Source, SourceCapabilities, SourceError,
};
use crate::utils::HttpClient;

/// EuropePMC REST API root
const EUROPE_PMC_REST_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest";

/// Results requested per page
const PAGE_SIZE: usize = 1000;

/// Major API version this adapter understands
const SUPPORTED_API_MAJOR: &str = "6";

const ID_PRIORITY: &[(IdKind, &str)] = &[
    (IdKind::Pmcid, "pmcid"),
    (IdKind::Doi, "doi"),
    (IdKind::Pmid, "pmid"),
    (IdKind::Title, "title"),
];

/// EuropePMC source
#[derive(Debug, Clone)]
pub struct EuropePmcSource {
    client: HttpClient,
    rest_url: String,
}

impl EuropePmcSource {
    /// Create a new EuropePMC source
    pub fn new() -> Result<Self, SourceError> {
        Ok(Self::with_client(HttpClient::new()?))
    }

    /// Create with a shared HTTP client
    pub fn with_client(client: HttpClient) -> Self {
        Self {
            client,
            rest_url: EUROPE_PMC_REST_URL.to_string(),
        }
    }

    /// Point the source at a different REST root (for testing)
    pub fn with_base_url(mut self, rest_url: impl Into<String>) -> Self {
        self.rest_url = rest_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Query parameters for one page
    fn build_params(query: &HarvestQuery, cursor: &Cursor) -> Vec<(&'static str, String)> {
        let mut search = query.query.clone();
        if !query.all {
            search.push_str(" OPEN_ACCESS:y");
        }

        let cursor_mark = match cursor {
            Cursor::Token(token) => token.clone(),
            Cursor::Offset(_) => "*".to_string(),
        };

        vec![
            ("query", search),
            ("resultType", "core".to_string()),
            ("format", "json".to_string()),
            ("pageSize", PAGE_SIZE.to_string()),
            ("cursorMark", cursor_mark),
        ]
    }

    /// Entries of `fullTextUrlList.fullTextUrl`
    fn fulltext_urls(record: &Record) -> &[Value] {
        record
            .pointer("/fullTextUrlList/fullTextUrl")
            .and_then(|v| v.as_array())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn is_html_style(entry: &Value) -> bool {
        matches!(str_field(entry, "documentStyle"), Some("html") | Some("doi"))
    }

    fn is_open_access(entry: &Value) -> bool {
        str_field(entry, "availabilityCode") == Some("OA")
    }

    fn pmcid(&self, record: &Record) -> Option<String> {
        let id = self.identifier(record);
        if id.kind == IdKind::Pmcid {
            Some(id.id)
        } else {
            None
        }
    }

    fn xml_url(&self, record: &Record) -> Option<String> {
        let Some(pmcid) = self.pmcid(record) else {
            tracing::warn!(
                "Article with {} did not have a PMCID (therefore no XML)",
                self.identifier(record)
            );
            return None;
        };

        let open_html = Self::fulltext_urls(record)
            .iter()
            .any(|u| Self::is_html_style(u) && Self::is_open_access(u));
        if !open_html {
            tracing::warn!(
                "Article with pmcid \"{}\" was not Open Access (therefore no XML)",
                pmcid
            );
            return None;
        }

        Some(format!("{}/{}/fullTextXML", self.rest_url, pmcid))
    }

    fn pdf_url(&self, record: &Record) -> Option<String> {
        let no_pdf = || -> Option<String> {
            tracing::warn!(
                "Article with {} had no fulltext PDF url",
                self.identifier(record)
            );
            None
        };

        if str_field(record, "hasPDF") == Some("N") {
            return no_pdf();
        }

        Self::fulltext_urls(record)
            .iter()
            .find(|u| str_field(u, "documentStyle") == Some("pdf") && Self::is_open_access(u))
            .and_then(|u| str_field(u, "url"))
            .map(str::to_string)
            .or_else(no_pdf)
    }

    fn pmcid_asset_url(&self, record: &Record, what: &str, path: impl Fn(&str) -> String) -> Option<String> {
        match self.pmcid(record) {
            Some(pmcid) => Some(path(&pmcid)),
            None => {
                tracing::warn!(
                    "Article with {} did not have a PMCID (therefore no {})",
                    self.identifier(record),
                    what
                );
                None
            }
        }
    }
}

#[async_trait]
impl Source for EuropePmcSource {
    fn id(&self) -> &str {
        "eupmc"
    }

    fn name(&self) -> &str {
        "EuropePMC"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::XML
            | SourceCapabilities::PDF
            | SourceCapabilities::SUPPLEMENTARY
            | SourceCapabilities::MINED_TERMS
            | SourceCapabilities::HTML_URLS
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
        let url = format!("{}/search", self.rest_url);
        let body = self
            .client
            .get_text(&url, &Self::build_params(query, cursor))
            .await?;

        serde_json::from_str(&body)
            .map_err(|e| SourceError::Parse(format!("Failed to parse EuropePMC JSON: {}", e)))
    }

    fn extract_total(&self, page: &PageResponse) -> Option<u64> {
        match page.get("hitCount")? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn extract_items(&self, page: &PageResponse) -> Option<Vec<Record>> {
        page.pointer("/resultList/result")
            .and_then(|v| v.as_array())
            .cloned()
    }

    fn next_cursor(&self, page: &PageResponse, _current: &Cursor) -> Option<Cursor> {
        str_field(page, "nextCursorMark").map(|mark| Cursor::Token(mark.to_string()))
    }

    fn check_api_version(&self, page: &PageResponse) {
        let Some(version) = str_field(page, "version") else {
            return;
        };
        let major = version.split('.').next().unwrap_or(version);
        if major != SUPPORTED_API_MAJOR {
            tracing::warn!(
                "This version of {} wasn't built with this version of the EuropePMC API in mind",
                env!("CARGO_PKG_NAME")
            );
            tracing::warn!(
                "Supported API major version: {} vs. {} reported by the API",
                SUPPORTED_API_MAJOR,
                version
            );
        }
    }

    fn identifier(&self, record: &Record) -> Identifier {
        Identifier::first_of(record, ID_PRIORITY)
    }

    fn asset_url(&self, record: &Record, kind: AssetKind) -> Option<String> {
        match kind {
            AssetKind::Xml => self.xml_url(record),
            AssetKind::Pdf => self.pdf_url(record),
            AssetKind::Supplementary => {
                self.pmcid_asset_url(record, "supplementary files", |pmcid| {
                    format!("{}/{}/supplementaryFiles", self.rest_url, pmcid)
                })
            }
            AssetKind::MinedTerms => self.pmcid_asset_url(record, "mined terms", |pmcid| {
                format!("{}/PMC/{}/textMinedTerms//1/1000/json", self.rest_url, pmcid)
            }),
        }
    }

    fn fulltext_html_url(&self, record: &Record) -> Option<String> {
        let mut html: Vec<&Value> = Self::fulltext_urls(record)
            .iter()
            .filter(|u| Self::is_html_style(u))
            .collect();
        // open access links first
        html.sort_by_key(|u| !Self::is_open_access(u));

        let url = html.first().and_then(|u| str_field(u, "url"));
        if url.is_none() {
            tracing::warn!(
                "Article with {} had no fulltext HTML url",
                self.identifier(record)
            );
        }
        url.map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source() -> EuropePmcSource {
        EuropePmcSource::new()
            .unwrap()
            .with_base_url("https://example.org/rest/")
    }

    fn oa_record() -> Record {
        json!({
            "pmcid": "PMC4321",
            "doi": "10.1/x",
            "hasPDF": "Y",
            "fullTextUrlList": {"fullTextUrl": [
                {"availabilityCode": "S", "documentStyle": "html", "url": "https://sub/html"},
                {"availabilityCode": "OA", "documentStyle": "html", "url": "https://oa/html"},
                {"availabilityCode": "S", "documentStyle": "pdf", "url": "https://sub/pdf"},
                {"availabilityCode": "OA", "documentStyle": "pdf", "url": "https://oa/pdf"}
            ]}
        })
    }

    #[test]
    fn test_build_params() {
        let query = HarvestQuery::new("malaria");
        let params = EuropePmcSource::build_params(&query, &Cursor::Token("*".into()));
        assert!(params.contains(&("query", "malaria OPEN_ACCESS:y".to_string())));
        assert!(params.contains(&("pageSize", "1000".to_string())));
        assert!(params.contains(&("cursorMark", "*".to_string())));
        assert!(params.contains(&("resultType", "core".to_string())));

        let all = HarvestQuery::new("malaria").all(true);
        let params = EuropePmcSource::build_params(&all, &Cursor::Token("AoJ".into()));
        assert!(params.contains(&("query", "malaria".to_string())));
        assert!(params.contains(&("cursorMark", "AoJ".to_string())));
    }

    #[test]
    fn test_extract_page_fields() {
        let source = source();
        let page = json!({
            "version": "6.9",
            "hitCount": 2,
            "nextCursorMark": "AoIIP",
            "resultList": {"result": [{"pmcid": "PMC1"}, {"pmcid": "PMC2"}]}
        });
        assert_eq!(source.extract_total(&page), Some(2));
        assert_eq!(source.extract_items(&page).unwrap().len(), 2);
        assert_eq!(
            source.next_cursor(&page, &Cursor::Token("*".into())),
            Some(Cursor::Token("AoIIP".into()))
        );

        let malformed = json!({"hitCount": 2, "resultList": {}});
        assert!(source.extract_items(&malformed).is_none());
        assert_eq!(source.extract_total(&json!({"hitCount": "17"})), Some(17));
    }

    #[test]
    fn test_identifier_priority() {
        let source = source();
        assert_eq!(source.identifier(&oa_record()).id, "PMC4321");
        let no_pmcid = json!({"doi": "10.1/x", "pmid": "99"});
        assert_eq!(source.identifier(&no_pmcid).kind, IdKind::Doi);
    }

    #[test]
    fn test_asset_urls() {
        let source = source();
        let record = oa_record();
        assert_eq!(
            source.asset_url(&record, AssetKind::Xml).as_deref(),
            Some("https://example.org/rest/PMC4321/fullTextXML")
        );
        assert_eq!(
            source.asset_url(&record, AssetKind::Pdf).as_deref(),
            Some("https://oa/pdf")
        );
        assert_eq!(
            source.asset_url(&record, AssetKind::Supplementary).as_deref(),
            Some("https://example.org/rest/PMC4321/supplementaryFiles")
        );
        assert_eq!(
            source.asset_url(&record, AssetKind::MinedTerms).as_deref(),
            Some("https://example.org/rest/PMC/PMC4321/textMinedTerms//1/1000/json")
        );
    }

    #[test]
    fn test_no_assets_without_pmcid_or_open_access() {
        let source = source();
        let doi_only = json!({"doi": "10.1/x"});
        assert!(source.asset_url(&doi_only, AssetKind::Xml).is_none());
        assert!(source.asset_url(&doi_only, AssetKind::MinedTerms).is_none());

        let closed = json!({
            "pmcid": "PMC1",
            "hasPDF": "N",
            "fullTextUrlList": {"fullTextUrl": [
                {"availabilityCode": "S", "documentStyle": "html", "url": "https://sub/html"},
                {"availabilityCode": "OA", "documentStyle": "pdf", "url": "https://oa/pdf"}
            ]}
        });
        assert!(source.asset_url(&closed, AssetKind::Xml).is_none());
        assert!(source.asset_url(&closed, AssetKind::Pdf).is_none());
    }

    #[test]
    fn test_fulltext_html_prefers_open_access() {
        let source = source();
        assert_eq!(
            source.fulltext_html_url(&oa_record()).as_deref(),
            Some("https://oa/html")
        );
        assert!(source.fulltext_html_url(&json!({"pmcid": "PMC1"})).is_none());
    }
}
