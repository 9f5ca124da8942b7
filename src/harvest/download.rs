//! Bounded worker pool that downloads queued assets to disk.
//!
//! `min(workers, queue length)` tokio tasks pop descriptors from one shared
//! FIFO queue until it is empty. Each descriptor ends up in exactly one of
//! four buckets: succeeded, skipped (file already on disk), missing (404) or
//! failed (retries exhausted).

use async_trait::async_trait;
use indicatif::ProgressBar;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::models::DownloadDescriptor;
use crate::utils::{with_retry, HttpClient, RetryConfig, Transient, TransientError};

/// Default number of concurrent download workers
pub const DEFAULT_WORKERS: usize = 10;

/// Failure fetching a single URL
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The server says the asset does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-success status
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// Transport failure
    #[error("network error: {0}")]
    Network(String),

    /// The request did not finish in time
    #[error("timed out fetching {0}")]
    Timeout(String),
}

impl Transient for FetchError {
    fn transient(&self) -> Option<TransientError> {
        match self {
            FetchError::Network(_) => Some(TransientError::Network),
            FetchError::Timeout(_) => Some(TransientError::Timeout),
            FetchError::Status { status, .. } => reqwest::StatusCode::from_u16(*status)
                .ok()
                .and_then(TransientError::from_status),
            FetchError::NotFound(_) => None,
        }
    }
}

/// Something that can turn a URL into bytes
#[async_trait]
pub trait Fetcher: Send + Sync + std::fmt::Debug {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else {
                FetchError::Network(format!("{}: {}", url, e))
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(format!("{}: {}", url, e)))?;
        Ok(body.to_vec())
    }
}

/// Fatal downloader errors; these abort every worker
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("failed to check {path}: {source}")]
    Check {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("download worker stopped unexpectedly: {0}")]
    Worker(String),
}

/// Outcome counts for one queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub succeeded: usize,
    pub skipped: usize,
    pub missing: usize,
    /// URLs that still failed after retrying
    pub failed: Vec<String>,
}

/// One-line verdict on a finished queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadSummary {
    AllSucceeded,
    MissingAssets { succeeded: usize, missing: usize },
    Failures { succeeded: usize, failed: usize },
}

impl DownloadReport {
    /// Descriptors accounted for
    pub fn attempted(&self) -> usize {
        self.succeeded + self.skipped + self.missing + self.failed.len()
    }

    /// Summarize the report; failures win over missing assets
    pub fn summary(&self) -> DownloadSummary {
        let succeeded = self.succeeded + self.skipped;
        if !self.failed.is_empty() {
            DownloadSummary::Failures {
                succeeded,
                failed: self.failed.len(),
            }
        } else if self.missing > 0 {
            DownloadSummary::MissingAssets {
                succeeded,
                missing: self.missing,
            }
        } else {
            DownloadSummary::AllSucceeded
        }
    }
}

#[derive(Debug, Default)]
struct Stats {
    succeeded: AtomicUsize,
    skipped: AtomicUsize,
    missing: AtomicUsize,
    failed: Mutex<Vec<String>>,
}

impl Stats {
    fn report(&self) -> DownloadReport {
        DownloadReport {
            succeeded: self.succeeded.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            missing: self.missing.load(Ordering::SeqCst),
            failed: self
                .failed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

/// Everything a worker needs, shared by reference count
#[derive(Debug, Clone)]
struct Worker {
    id: usize,
    queue: Arc<Mutex<VecDeque<DownloadDescriptor>>>,
    fetcher: Arc<dyn Fetcher>,
    output_dir: Arc<PathBuf>,
    retry: RetryConfig,
    stats: Arc<Stats>,
    progress: Option<ProgressBar>,
}

impl Worker {
    fn next(&self) -> Option<DownloadDescriptor> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn tick(&self) {
        if let Some(progress) = &self.progress {
            progress.inc(1);
        }
    }

    async fn run(self) -> Result<(), DownloadError> {
        let mut writes: JoinSet<Result<(), DownloadError>> = JoinSet::new();

        while let Some(desc) = self.next() {
            let path = desc.target_path(&self.output_dir);

            let exists = tokio::fs::try_exists(&path)
                .await
                .map_err(|source| DownloadError::Check {
                    path: path.clone(),
                    source,
                })?;
            if exists {
                info!("{} already exists, skipping", path.display());
                self.stats.skipped.fetch_add(1, Ordering::SeqCst);
                self.tick();
                continue;
            }

            let dir = desc.target_dir(&self.output_dir);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|source| DownloadError::CreateDir { path: dir, source })?;

            debug!("worker {} downloading {}: {}", self.id, desc.kind, desc.url);
            match with_retry(self.retry, || self.fetcher.fetch(&desc.url)).await {
                Ok(body) => {
                    let stats = Arc::clone(&self.stats);
                    writes.spawn(async move {
                        tokio::fs::write(&path, body)
                            .await
                            .map_err(|source| DownloadError::Write { path, source })?;
                        stats.succeeded.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    });
                }
                Err(FetchError::NotFound(url)) => {
                    debug!("{} for {} not available: {}", desc.kind, desc.id, url);
                    self.stats.missing.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => {
                    warn!("Download of {} for {} failed: {}", desc.kind, desc.id, e);
                    self.stats
                        .failed
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(desc.url.clone());
                }
            }
            self.tick();
        }

        while let Some(written) = writes.join_next().await {
            written.map_err(|e| DownloadError::Worker(e.to_string()))??;
        }
        Ok(())
    }
}

/// Fixed-size pool of download workers writing under one output directory
#[derive(Debug, Clone)]
pub struct Downloader {
    fetcher: Arc<dyn Fetcher>,
    output_dir: PathBuf,
    workers: usize,
    retry: RetryConfig,
    progress: Option<ProgressBar>,
}

impl Downloader {
    /// Create a downloader; `workers` is clamped to at least one
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        output_dir: impl Into<PathBuf>,
        workers: usize,
        retry: RetryConfig,
    ) -> Self {
        Self {
            fetcher,
            output_dir: output_dir.into(),
            workers: workers.max(1),
            retry,
            progress: None,
        }
    }

    /// Report progress on this bar
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Root directory the per-record folders are created in
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Download every descriptor, returning once all have been attempted.
    ///
    /// A filesystem error stops all workers and is returned; fetch failures
    /// are only counted.
    pub async fn download_all(
        &self,
        descriptors: Vec<DownloadDescriptor>,
    ) -> Result<DownloadReport, DownloadError> {
        let total = descriptors.len();
        if total == 0 {
            return Ok(DownloadReport::default());
        }
        if let Some(progress) = &self.progress {
            progress.set_length(total as u64);
        }

        let queue = Arc::new(Mutex::new(VecDeque::from(descriptors)));
        let stats = Arc::new(Stats::default());
        let output_dir = Arc::new(self.output_dir.clone());
        let worker_count = self.workers.min(total);
        debug!("starting {} download workers for {} items", worker_count, total);

        let mut set = JoinSet::new();
        for id in 0..worker_count {
            let worker = Worker {
                id,
                queue: Arc::clone(&queue),
                fetcher: Arc::clone(&self.fetcher),
                output_dir: Arc::clone(&output_dir),
                retry: self.retry,
                stats: Arc::clone(&stats),
                progress: self.progress.clone(),
            };
            set.spawn(worker.run());
        }

        while let Some(joined) = set.join_next().await {
            let result = joined.map_err(|e| DownloadError::Worker(e.to_string()));
            if let Err(e) = result.and_then(|r| r) {
                set.abort_all();
                return Err(e);
            }
        }

        let report = stats.report();
        debug!(
            "downloads finished: {} succeeded, {} skipped, {} missing, {} failed",
            report.succeeded,
            report.skipped,
            report.missing,
            report.failed.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssetKind;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Serves canned bodies, answers 404 for unknown URLs and records every
    /// request it sees.
    #[derive(Debug, Default)]
    struct ScriptedFetcher {
        bodies: HashMap<String, Vec<u8>>,
        flaky: Mutex<HashMap<String, usize>>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn serve(mut self, url: &str, body: &str) -> Self {
            self.bodies.insert(url.to_string(), body.as_bytes().to_vec());
            self
        }

        /// Fail `url` with a 503 this many times before serving it
        fn flaky(self, url: &str, failures: usize) -> Self {
            self.flaky.lock().unwrap().insert(url.to_string(), failures);
            self
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.seen.lock().unwrap().push(url.to_string());
            if let Some(left) = self.flaky.lock().unwrap().get_mut(url) {
                if *left > 0 {
                    *left -= 1;
                    return Err(FetchError::Status {
                        status: 503,
                        url: url.to_string(),
                    });
                }
            }
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::NotFound(url.to_string()))
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            max_total_time: Duration::from_secs(1),
        }
    }

    fn desc(n: usize) -> DownloadDescriptor {
        DownloadDescriptor::new(
            format!("http://x/{}", n),
            format!("PMC{}", n),
            AssetKind::Pdf,
            "fulltext.pdf",
        )
    }

    #[tokio::test]
    async fn test_more_items_than_workers() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = ScriptedFetcher::default();
        for n in 0..25 {
            fetcher = fetcher.serve(&format!("http://x/{}", n), "pdf");
        }
        let fetcher = Arc::new(fetcher);

        let downloader = Downloader::new(fetcher.clone(), dir.path(), 4, fast_retry());
        let report = downloader
            .download_all((0..25).map(desc).collect())
            .await
            .unwrap();

        assert_eq!(report.succeeded, 25);
        assert_eq!(report.attempted(), 25);
        assert_eq!(report.summary(), DownloadSummary::AllSucceeded);

        let mut seen = fetcher.seen();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 25, "each descriptor fetched exactly once");
        assert_eq!(fetcher.seen().len(), 25);
        assert!(dir.path().join("PMC24").join("fulltext.pdf").is_file());
    }

    #[tokio::test]
    async fn test_existing_file_is_not_fetched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("PMC1")).unwrap();
        std::fs::write(dir.path().join("PMC1").join("fulltext.pdf"), "old").unwrap();

        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .serve("http://x/1", "new")
                .serve("http://x/2", "new"),
        );
        let downloader = Downloader::new(fetcher.clone(), dir.path(), 10, fast_retry());
        let report = downloader
            .download_all(vec![desc(1), desc(2)])
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(fetcher.seen(), vec!["http://x/2".to_string()]);
        let kept = std::fs::read_to_string(dir.path().join("PMC1").join("fulltext.pdf")).unwrap();
        assert_eq!(kept, "old");
    }

    #[tokio::test]
    async fn test_not_found_is_missing_and_queue_continues() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .serve("http://x/1", "a")
                .serve("http://x/3", "c"),
        );
        let downloader = Downloader::new(fetcher.clone(), dir.path(), 1, fast_retry());
        let report = downloader
            .download_all(vec![desc(1), desc(2), desc(3)])
            .await
            .unwrap();

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.missing, 1);
        assert!(report.failed.is_empty());
        assert_eq!(
            report.summary(),
            DownloadSummary::MissingAssets {
                succeeded: 2,
                missing: 1
            }
        );
        // a 404 is never retried
        assert_eq!(fetcher.seen().len(), 3);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_then_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .serve("http://x/1", "a")
                .flaky("http://x/1", 2)
                .serve("http://x/2", "b")
                .flaky("http://x/2", 10),
        );
        let downloader = Downloader::new(fetcher.clone(), dir.path(), 2, fast_retry());
        let report = downloader
            .download_all(vec![desc(1), desc(2)])
            .await
            .unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, vec!["http://x/2".to_string()]);
        assert_eq!(
            report.summary(),
            DownloadSummary::Failures {
                succeeded: 1,
                failed: 1
            }
        );
    }

    #[tokio::test]
    async fn test_filesystem_error_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // a file where the record directory should go
        std::fs::write(dir.path().join("PMC1"), "not a dir").unwrap();

        let fetcher = Arc::new(ScriptedFetcher::default().serve("http://x/1", "a"));
        let downloader = Downloader::new(fetcher, dir.path(), 2, fast_retry());
        let result = downloader.download_all(vec![desc(1)]).await;

        assert!(matches!(
            result,
            Err(DownloadError::CreateDir { .. }) | Err(DownloadError::Check { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(
            Arc::new(ScriptedFetcher::default()),
            dir.path(),
            10,
            fast_retry(),
        );
        let report = downloader.download_all(Vec::new()).await.unwrap();
        assert_eq!(report, DownloadReport::default());
    }

    #[tokio::test]
    async fn test_http_fetcher_maps_404() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/present")
            .with_status(200)
            .with_body("bytes")
            .create_async()
            .await;
        server
            .mock("GET", "/absent")
            .with_status(404)
            .create_async()
            .await;

        let client = HttpClient::new().unwrap();
        let body = client
            .fetch(&format!("{}/present", server.url()))
            .await
            .unwrap();
        assert_eq!(body, b"bytes");

        let absent = client.fetch(&format!("{}/absent", server.url())).await;
        assert!(matches!(absent, Err(FetchError::NotFound(_))));
    }
}
