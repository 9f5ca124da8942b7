//! The harvest pipeline: search, reconcile, persist, then download.
//!
//! [`Harvester`] ties the pieces together for one run:
//!
//! 1. [`Paginator`] collects records page by page (or the previous results
//!    file is loaded when restarting)
//! 2. [`reconcile`] removes duplicates and applies the hit limit, and
//!    [`persist`] writes the metadata files
//! 3. [`TaskSequencer`] runs one download task per requested asset kind,
//!    each backed by the [`Downloader`] worker pool

mod download;
mod minedterms;
mod paginator;
mod reconcile;
mod tasks;

pub use download::{
    DownloadError, DownloadReport, DownloadSummary, Downloader, FetchError, Fetcher,
    DEFAULT_WORKERS,
};
pub use minedterms::{summarise_mined_terms, SUMMARY_DIR};
pub use paginator::{PageStep, PaginationState, Paginator, PaginatorSettings, SearchOutcome};
pub use reconcile::{load_previous_results, persist, reconcile, results_path, PersistSummary};
pub use tasks::{
    build_queue, plan_tasks, AssetDownloadTask, MinedTermsSummaryTask, SequencerState, Task,
    TaskSequencer,
};

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::HarvestConfig;
use crate::models::{HarvestQuery, ResultSet};
use crate::sources::{Source, SourceError};
use crate::ui;
use crate::utils::{download_retry_config, RetryConfig};

/// Errors that end a harvest run
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("{source_name} kept returning malformed responses ({attempts} attempts)")]
    Malformed { source_name: String, attempts: u32 },

    #[error("no existing download to restart: {} not found", .0.display())]
    NoRestartFile(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize results: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum HarvestOutcome {
    /// Nothing to collect
    NoHits,
    /// Count-only mode
    CountOnly(u64),
    /// Results were collected (or reloaded) and the download tasks ran
    Completed { results: usize, partial: bool },
}

/// One harvest run against a single source
#[derive(Debug, Clone)]
pub struct Harvester {
    source: Arc<dyn Source>,
    fetcher: Arc<dyn Fetcher>,
    output_dir: PathBuf,
    paginator: PaginatorSettings,
    workers: usize,
    download_retry: RetryConfig,
    show_progress: bool,
}

impl Harvester {
    /// Create a harvester with default settings
    pub fn new(
        source: Arc<dyn Source>,
        fetcher: Arc<dyn Fetcher>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            fetcher,
            output_dir: output_dir.into(),
            paginator: PaginatorSettings::default(),
            workers: DEFAULT_WORKERS,
            download_retry: download_retry_config(),
            show_progress: false,
        }
    }

    /// Apply paging and download settings from the configuration
    pub fn with_config(mut self, config: &HarvestConfig) -> Self {
        self.paginator = config.paginator_settings();
        self.workers = config.download.workers;
        self.download_retry = config.download_retry();
        self
    }

    pub fn with_paginator_settings(mut self, settings: PaginatorSettings) -> Self {
        self.paginator = settings;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_download_retry(mut self, retry: RetryConfig) -> Self {
        self.download_retry = retry;
        self
    }

    /// Draw progress bars
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Run search (or restart), persistence and the download tasks
    pub async fn run(&self, query: &HarvestQuery) -> Result<HarvestOutcome, HarvestError> {
        let source = self.source.as_ref();
        source.validate_config()?;

        let (results, partial) = if query.restart {
            info!("Restarting previous download from {}", source.name());
            (load_previous_results(&self.output_dir, source.id()).await?, false)
        } else {
            info!("Searching {} for {}", source.name(), query.query);
            let progress = ui::search_progress(source.name(), self.show_progress);
            let paginator = Paginator::new(Arc::clone(&self.source), self.paginator)
                .with_progress(progress.clone());
            let outcome = paginator.search(query).await;
            progress.finish_and_clear();

            match outcome? {
                SearchOutcome::Empty => return Ok(HarvestOutcome::NoHits),
                SearchOutcome::CountOnly(total) => return Ok(HarvestOutcome::CountOnly(total)),
                SearchOutcome::Results {
                    results,
                    hit_limit,
                    partial,
                } => {
                    let results = reconcile(results, hit_limit, source);
                    persist(&results, source, &self.output_dir).await?;
                    (results, partial)
                }
            }
        };

        if partial {
            warn!("Continuing with {} of the expected results", results.len());
        }
        let count = results.len();
        self.run_tasks(query, results).await?;
        Ok(HarvestOutcome::Completed {
            results: count,
            partial,
        })
    }

    async fn run_tasks(&self, query: &HarvestQuery, results: ResultSet) -> Result<(), HarvestError> {
        let downloader = Downloader::new(
            Arc::clone(&self.fetcher),
            self.output_dir.clone(),
            self.workers,
            self.download_retry,
        );
        let tasks = plan_tasks(
            query,
            Arc::clone(&self.source),
            Arc::new(results),
            &downloader,
            self.show_progress,
        );
        TaskSequencer::new(tasks).run().await
    }
}
