//! Generic cursor/offset paginator shared by every source.
//!
//! The paginator asks a [`Source`] for one page at a time and accumulates the
//! items until the hit limit is reached, the source runs dry, or a page comes
//! back short while more hits were promised.

use indicatif::ProgressBar;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::HarvestError;
use crate::models::{HarvestQuery, Record, ResultSet};
use crate::sources::{Cursor, PageResponse, Source, SourceError};
use crate::utils::{api_retry_config, with_retry, RetryConfig};

/// Paging behaviour
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaginatorSettings {
    /// Deadline for a single page request
    pub page_timeout: Duration,
    /// Backoff for timeouts and transport failures
    pub retry: RetryConfig,
    /// Pause before re-requesting a malformed page
    pub malformed_retry_delay: Duration,
    /// Malformed responses tolerated for one page
    pub max_malformed_attempts: u32,
}

impl Default for PaginatorSettings {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(120),
            retry: api_retry_config(),
            malformed_retry_delay: Duration::from_secs(3),
            max_malformed_attempts: 10,
        }
    }
}

/// What a search produced
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// The source reported no hits, or a limit of zero was requested
    Empty,
    /// Count-only mode: the reported hit count
    CountOnly(u64),
    /// Collected records
    Results {
        results: ResultSet,
        hit_limit: usize,
        /// Paging stopped early on a transport failure
        partial: bool,
    },
}

/// What to do after a page has been absorbed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStep {
    Continue,
    Finish,
}

/// Paging state for a single search
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationState {
    pub cursor: Cursor,
    pub page_size: usize,
    pub total_hit_count: u64,
    pub hit_limit: usize,
    /// Cap for the next page once fewer than a page of hits remain
    pub residual_hits: Option<usize>,
    /// A well-formed page came back short before the limit was reached
    pub unfilled_page_seen: bool,
    records: Vec<Record>,
}

impl PaginationState {
    /// Start a search at `cursor`
    pub fn new(cursor: Cursor, page_size: usize) -> Self {
        Self {
            cursor,
            page_size,
            total_hit_count: 0,
            hit_limit: 0,
            residual_hits: None,
            unfilled_page_seen: false,
            records: Vec::new(),
        }
    }

    /// Record the reported hit count and derive the effective limit
    pub fn set_total(&mut self, total: u64, requested: Option<usize>) {
        self.total_hit_count = total;
        let total = usize::try_from(total).unwrap_or(usize::MAX);
        self.hit_limit = match requested {
            Some(limit) if limit < total => {
                info!("Limiting to {} hits", limit);
                limit
            }
            _ => total,
        };
        self.update_residual();
    }

    /// Number of records collected so far
    pub fn accumulated(&self) -> usize {
        self.records.len()
    }

    /// Append one page of items and decide whether to keep paging
    pub fn absorb(&mut self, mut items: Vec<Record>) -> PageStep {
        let received = items.len();
        if let Some(residual) = self.residual_hits {
            items.truncate(residual);
        }
        debug!("In this batch got: {} results", items.len());
        self.records.extend(items);

        let accumulated = self.accumulated();
        if accumulated >= self.hit_limit {
            info!("Done collecting results");
            return PageStep::Finish;
        }
        if received < self.page_size {
            self.unfilled_page_seen = true;
            info!(
                "Source reported {} hits but ran out after {}; all results collected",
                self.total_hit_count, accumulated
            );
            return PageStep::Finish;
        }
        self.update_residual();
        PageStep::Continue
    }

    fn update_residual(&mut self) {
        let remaining = self.hit_limit.saturating_sub(self.accumulated());
        if remaining < self.page_size {
            self.residual_hits = Some(remaining);
        }
    }

    /// Hand the collected records off
    pub fn into_results(self) -> ResultSet {
        ResultSet::new(self.records)
    }
}

/// Why a page could not be used
enum PageFailure {
    Malformed(String),
    Transport(SourceError),
}

/// Drives a [`Source`] page by page
#[derive(Debug, Clone)]
pub struct Paginator {
    source: Arc<dyn Source>,
    settings: PaginatorSettings,
    progress: Option<ProgressBar>,
}

impl Paginator {
    /// Create a paginator over `source`
    pub fn new(source: Arc<dyn Source>, settings: PaginatorSettings) -> Self {
        Self {
            source,
            settings,
            progress: None,
        }
    }

    /// Report collected records on this bar
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run the search to completion
    pub async fn search(&self, query: &HarvestQuery) -> Result<SearchOutcome, HarvestError> {
        let source = self.source.as_ref();
        let mut state = PaginationState::new(source.initial_cursor(), source.page_size());
        let mut first = true;
        let mut malformed = 0u32;

        loop {
            let page = match self.fetch(query, &state.cursor).await {
                Ok(page) => page,
                Err(PageFailure::Malformed(reason)) => {
                    malformed += 1;
                    self.malformed(&state.cursor, &reason, malformed).await?;
                    continue;
                }
                Err(PageFailure::Transport(e)) => {
                    error!("Failed to retrieve {} from {}: {}", state.cursor, source.name(), e);
                    if state.accumulated() == 0 {
                        return Err(e.into());
                    }
                    warn!("Handling the limited number of search results we got");
                    warn!("The metadata download did not finish so you *will* be missing some results");
                    return Ok(self.finish(state, true));
                }
            };

            if first {
                let Some(total) = source.extract_total(&page) else {
                    malformed += 1;
                    self.malformed(&state.cursor, "no hit count", malformed).await?;
                    continue;
                };
                let clause = if query.all { "" } else { " open access" };
                info!("Found {}{} results", total, clause);
                source.check_api_version(&page);

                if total == 0 {
                    return Ok(SearchOutcome::Empty);
                }
                if query.no_execute {
                    return Ok(SearchOutcome::CountOnly(total));
                }
                if query.hit_limit == Some(0) {
                    info!("Hit limit is 0, nothing to collect");
                    return Ok(SearchOutcome::Empty);
                }
                state.set_total(total, query.hit_limit);
                if let Some(progress) = &self.progress {
                    progress.set_length(state.hit_limit as u64);
                }
            }

            let Some(items) = source.extract_items(&page) else {
                malformed += 1;
                self.malformed(&state.cursor, "no result list", malformed).await?;
                continue;
            };
            first = false;
            malformed = 0;

            let before = state.accumulated();
            let step = state.absorb(items);
            if let Some(progress) = &self.progress {
                progress.inc((state.accumulated() - before) as u64);
            }
            if step == PageStep::Finish {
                return Ok(self.finish(state, false));
            }

            match source.next_cursor(&page, &state.cursor) {
                Some(next) if next != state.cursor => state.cursor = next,
                _ => {
                    info!("{} has no further pages", source.name());
                    return Ok(self.finish(state, false));
                }
            }

            let delay = source.page_delay();
            if !delay.is_zero() {
                debug!("Waiting {:?} before the next page", delay);
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Fetch one page with a deadline, retrying transport failures
    async fn fetch(&self, query: &HarvestQuery, cursor: &Cursor) -> Result<PageResponse, PageFailure> {
        let source = self.source.as_ref();
        let timeout = self.settings.page_timeout;
        debug!("Requesting {} from {}", cursor, source.name());

        let result = with_retry(self.settings.retry, || async move {
            match tokio::time::timeout(timeout, source.fetch_page(query, cursor)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Did not get a response from {} within {:?}", source.name(), timeout);
                    Err(SourceError::Timeout(timeout))
                }
            }
        })
        .await;

        match result {
            Ok(page) => Ok(page),
            Err(SourceError::Parse(reason)) => Err(PageFailure::Malformed(reason)),
            Err(e) => Err(PageFailure::Transport(e)),
        }
    }

    /// Log a malformed page and wait before re-requesting it
    async fn malformed(&self, cursor: &Cursor, reason: &str, attempts: u32) -> Result<(), HarvestError> {
        error!(
            "Malformed response from {} at {}: {}",
            self.source.name(),
            cursor,
            reason
        );
        if attempts >= self.settings.max_malformed_attempts {
            return Err(HarvestError::Malformed {
                source_name: self.source.name().to_string(),
                attempts,
            });
        }
        info!(
            "Retrying the same page in {:?} (attempt {} of {})",
            self.settings.malformed_retry_delay,
            attempts + 1,
            self.settings.max_malformed_attempts
        );
        tokio::time::sleep(self.settings.malformed_retry_delay).await;
        Ok(())
    }

    fn finish(&self, state: PaginationState, partial: bool) -> SearchOutcome {
        if let Some(progress) = &self.progress {
            progress.finish_and_clear();
        }
        let hit_limit = state.hit_limit;
        SearchOutcome::Results {
            results: state.into_results(),
            hit_limit,
            partial,
        }
    }
}
