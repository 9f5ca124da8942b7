//! Harvest request model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::AssetKind;

/// Everything a run needs to know about what to collect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestQuery {
    /// Search query in the source's own syntax
    pub query: String,

    /// Cap on the number of results to collect
    pub hit_limit: Option<usize>,

    /// Include results that are not open access
    pub all: bool,

    /// Only report the hit count
    pub no_execute: bool,

    /// Reuse the previous run's result file instead of searching
    pub restart: bool,

    /// Source-specific filters (CrossRef `key:value` pairs)
    pub filters: Vec<(String, String)>,

    /// Asset kinds to download after collection
    pub assets: BTreeSet<AssetKind>,
}

impl HarvestQuery {
    /// Create a new query
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Set the hit limit
    pub fn hit_limit(mut self, limit: usize) -> Self {
        self.hit_limit = Some(limit);
        self
    }

    /// Include non open-access results
    pub fn all(mut self, all: bool) -> Self {
        self.all = all;
        self
    }

    /// Only count hits
    pub fn no_execute(mut self, no_execute: bool) -> Self {
        self.no_execute = no_execute;
        self
    }

    /// Restart from a previous result file
    pub fn restart(mut self, restart: bool) -> Self {
        self.restart = restart;
        self
    }

    /// Request an asset kind
    pub fn asset(mut self, kind: AssetKind) -> Self {
        self.assets.insert(kind);
        self
    }

    /// Add filters from a `key:value,key:value` list.
    ///
    /// Entries without a colon are ignored with a warning.
    pub fn filters_from_str(mut self, filters: &str) -> Self {
        for entry in filters.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.split_once(':') {
                Some((key, value)) => self
                    .filters
                    .push((key.trim().to_string(), value.trim().to_string())),
                None => tracing::warn!("Ignoring filter without a value: {}", entry),
            }
        }
        self
    }

    /// Whether an asset kind was requested
    pub fn wants(&self, kind: AssetKind) -> bool {
        self.assets.contains(&kind)
    }
}
