//! Post-collection tasks and the sequencer that runs them in order.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::download::Downloader;
use super::minedterms::summarise_mined_terms;
use super::HarvestError;
use crate::models::{AssetKind, AssetLink, DownloadDescriptor, HarvestQuery, ResultSet};
use crate::sources::Source;
use crate::ui;
use crate::utils::validate_download_url;

/// A unit of post-collection work
#[async_trait]
pub trait Task: Send + Sync + std::fmt::Debug {
    /// Short name used in log lines
    fn name(&self) -> String;

    async fn run(&self) -> Result<(), HarvestError>;
}

/// Build the download queue for one asset kind
pub fn build_queue(source: &dyn Source, results: &ResultSet, kind: AssetKind) -> Vec<DownloadDescriptor> {
    let links = results.iter().filter_map(|record| {
        let id = source.identifier(record);
        let Some(url) = source.asset_url(record, kind) else {
            debug!("Article with {} has no {}", id, kind);
            return None;
        };
        match validate_download_url(&url) {
            Ok(url) => Some(AssetLink::new(url, id.id)),
            Err(e) => {
                warn!("Skipping {} for {}: {}", kind, id, e);
                None
            }
        }
    });
    DownloadDescriptor::queue_from_links(links, kind, source.asset_filename(kind))
}

/// Download one asset kind for every collected record
#[derive(Debug)]
pub struct AssetDownloadTask {
    kind: AssetKind,
    source: Arc<dyn Source>,
    results: Arc<ResultSet>,
    downloader: Downloader,
    show_progress: bool,
}

impl AssetDownloadTask {
    pub fn new(
        kind: AssetKind,
        source: Arc<dyn Source>,
        results: Arc<ResultSet>,
        downloader: Downloader,
        show_progress: bool,
    ) -> Self {
        Self {
            kind,
            source,
            results,
            downloader,
            show_progress,
        }
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }
}

#[async_trait]
impl Task for AssetDownloadTask {
    fn name(&self) -> String {
        format!("{} download", self.kind)
    }

    async fn run(&self) -> Result<(), HarvestError> {
        let queue = build_queue(self.source.as_ref(), &self.results, self.kind);
        if queue.is_empty() {
            info!("No {} URLs found for {} results", self.kind, self.results.len());
            return Ok(());
        }
        info!("Got {} {} URLs to download", queue.len(), self.kind);

        let progress = ui::download_progress(self.kind, self.show_progress);
        let report = self
            .downloader
            .clone()
            .with_progress(progress.clone())
            .download_all(queue)
            .await?;
        progress.finish_and_clear();

        for url in &report.failed {
            warn!("Giving up on {}", url);
        }
        ui::print_download_summary(self.kind, &report);
        Ok(())
    }
}

/// Write the per-semantic-type mined-terms CSV files
#[derive(Debug)]
pub struct MinedTermsSummaryTask {
    output_dir: PathBuf,
}

impl MinedTermsSummaryTask {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl Task for MinedTermsSummaryTask {
    fn name(&self) -> String {
        "mined terms summary".to_string()
    }

    async fn run(&self) -> Result<(), HarvestError> {
        let written = summarise_mined_terms(&self.output_dir).await?;
        info!("Wrote {} mined term summary files", written.len());
        Ok(())
    }
}

/// Tasks for the requested asset kinds, in execution order.
///
/// Kinds the source cannot supply are logged and left out; the mined-terms
/// summary follows the mined-terms download.
pub fn plan_tasks(
    query: &HarvestQuery,
    source: Arc<dyn Source>,
    results: Arc<ResultSet>,
    downloader: &Downloader,
    show_progress: bool,
) -> Vec<Box<dyn Task>> {
    let mut tasks: Vec<Box<dyn Task>> = Vec::new();
    for kind in AssetKind::ALL {
        if !query.wants(kind) {
            continue;
        }
        if !source.supports(kind) {
            warn!(
                "{} does not provide {}, so that request will be ignored",
                source.name(),
                kind
            );
            continue;
        }
        tasks.push(Box::new(AssetDownloadTask::new(
            kind,
            Arc::clone(&source),
            Arc::clone(&results),
            downloader.clone(),
            show_progress,
        )));
        if kind == AssetKind::MinedTerms {
            tasks.push(Box::new(MinedTermsSummaryTask::new(downloader.output_dir())));
        }
    }
    tasks
}

/// Where the sequencer is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    Running(usize),
    Done,
}

/// Runs tasks strictly one after another
#[derive(Debug)]
pub struct TaskSequencer {
    tasks: Vec<Box<dyn Task>>,
    state: SequencerState,
}

impl TaskSequencer {
    pub fn new(tasks: Vec<Box<dyn Task>>) -> Self {
        Self {
            tasks,
            state: SequencerState::Idle,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every task in order; the first error stops the sequence
    pub async fn run(&mut self) -> Result<(), HarvestError> {
        for (i, task) in self.tasks.iter().enumerate() {
            self.state = SequencerState::Running(i);
            debug!("Starting task {} of {}: {}", i + 1, self.tasks.len(), task.name());
            task.run().await?;
        }
        self.state = SequencerState::Done;
        info!("All tasks complete");
        Ok(())
    }
}
