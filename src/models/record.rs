//! Search result records and their stable identifiers.

use serde::{Deserialize, Serialize};

use crate::utils::sanitize_path_component;

/// A single search result exactly as the source returned it.
///
/// Records stay opaque JSON so that the persisted metadata keeps every field
/// the source reported, not just the ones this crate understands.
pub type Record = serde_json::Value;

/// Which field an [`Identifier`] was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Pmcid,
    Doi,
    Pmid,
    Title,
    Arxiv,
    ArticleNumber,
    Unknown,
}

impl IdKind {
    /// Returns the display name of the identifier kind
    pub fn name(&self) -> &'static str {
        match self {
            IdKind::Pmcid => "pmcid",
            IdKind::Doi => "doi",
            IdKind::Pmid => "pmid",
            IdKind::Title => "title",
            IdKind::Arxiv => "arxiv",
            IdKind::ArticleNumber => "article_number",
            IdKind::Unknown => "error",
        }
    }
}

impl std::fmt::Display for IdKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Stable identifier of a record, used for deduplication and as the name of
/// the per-record output directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    pub kind: IdKind,
    pub id: String,
}

impl Identifier {
    /// Create a new identifier
    pub fn new(kind: IdKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Identifier used when no candidate field is present
    pub fn unknown() -> Self {
        Self::new(IdKind::Unknown, "unknown ID")
    }

    /// Pick the first candidate field that holds a non-empty value.
    ///
    /// Candidates are checked in order, so the slice doubles as the
    /// source's priority list. Numeric fields are accepted as well since
    /// some APIs report PMIDs and article numbers as numbers.
    pub fn first_of(record: &Record, candidates: &[(IdKind, &str)]) -> Self {
        candidates
            .iter()
            .find_map(|(kind, field)| {
                let value = match record.get(*field)? {
                    serde_json::Value::String(s) => s.trim().to_string(),
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Array(values) => values
                        .first()
                        .and_then(|v| v.as_str())
                        .map(|s| s.trim().to_string())?,
                    _ => return None,
                };
                (!value.is_empty()).then(|| Identifier::new(*kind, value))
            })
            .unwrap_or_else(Identifier::unknown)
    }

    /// Directory name for this identifier.
    ///
    /// Slashes become underscores first so DOIs stay readable, then the
    /// result goes through the usual filesystem sanitization.
    pub fn dir_name(&self) -> String {
        sanitize_path_component(&self.id.replace('/', "_"))
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} \"{}\"", self.kind, self.id)
    }
}

/// Ordered, read-only collection of records handed from the paginator to the
/// reconciler and then to the download tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet {
    records: Vec<Record>,
}

impl ResultSet {
    /// Freeze a list of records into a result set
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Records in collection order
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Iterate over the records
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the set holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Give the records back, e.g. to build a reconciled set
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}
