//! Deduplication, truncation and on-disk persistence of collected results.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::HarvestError;
use crate::models::{Identifier, ResultSet};
use crate::sources::{Source, SourceCapabilities};

/// Path of the collection-wide results file for a source
pub fn results_path(output_dir: &Path, source_id: &str) -> PathBuf {
    output_dir.join(format!("{}_results.json", source_id))
}

/// Drop duplicate identifiers (first occurrence wins) and cap the set at
/// `hit_limit` records.
pub fn reconcile(results: ResultSet, hit_limit: usize, source: &dyn Source) -> ResultSet {
    let before = results.len();
    let mut seen: HashSet<Identifier> = HashSet::with_capacity(before);
    let mut unique: Vec<_> = results
        .into_records()
        .into_iter()
        .filter(|record| seen.insert(source.identifier(record)))
        .collect();

    if unique.len() < before {
        info!(
            "Removed {} duplicate results, {} unique results remain",
            before - unique.len(),
            unique.len()
        );
    }
    if unique.len() > hit_limit {
        info!("Limiting to {} results", hit_limit);
        unique.truncate(hit_limit);
    }
    ResultSet::new(unique)
}

/// Files written by [`persist`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub results_file: PathBuf,
    pub record_files: usize,
    pub html_urls_file: Option<PathBuf>,
}

/// Write the results file, one metadata file per record and, when the source
/// can derive them, the fulltext HTML URL list.
pub async fn persist(
    results: &ResultSet,
    source: &dyn Source,
    output_dir: &Path,
) -> Result<PersistSummary, HarvestError> {
    let results_file = results_path(output_dir, source.id());
    info!("Saving result metadata to {}", results_file.display());
    tokio::fs::write(&results_file, serde_json::to_vec_pretty(results)?).await?;

    let record_name = format!("{}_result.json", source.id());
    for record in results.iter() {
        let dir = output_dir.join(source.identifier(record).dir_name());
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&record_name), serde_json::to_vec_pretty(record)?).await?;
    }
    debug!("Wrote {} per-record metadata files", results.len());

    let mut html_urls_file = None;
    if source.capabilities().contains(SourceCapabilities::HTML_URLS) {
        let urls: Vec<String> = results
            .iter()
            .filter_map(|record| source.fulltext_html_url(record))
            .collect();
        if !urls.is_empty() {
            let path = output_dir.join(format!("{}_fulltext_html_urls.txt", source.id()));
            info!("Writing {} fulltext HTML URLs to {}", urls.len(), path.display());
            let mut body = urls.join("\n");
            body.push('\n');
            tokio::fs::write(&path, body).await?;
            html_urls_file = Some(path);
        }
    }

    Ok(PersistSummary {
        results_file,
        record_files: results.len(),
        html_urls_file,
    })
}

/// Load the results file from an earlier run
pub async fn load_previous_results(
    output_dir: &Path,
    source_id: &str,
) -> Result<ResultSet, HarvestError> {
    let path = results_path(output_dir, source_id);
    let body = match tokio::fs::read(&path).await {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(HarvestError::NoRestartFile(path));
        }
        Err(e) => return Err(e.into()),
    };
    let results: ResultSet = serde_json::from_slice(&body)?;
    info!(
        "Restarting from {} with {} results",
        path.display(),
        results.len()
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockSource;
    use serde_json::json;

    #[test]
    fn test_reconcile_dedups_and_truncates() {
        let source = MockSource::default();
        let records = vec![
            MockSource::record(1),
            MockSource::record(2),
            MockSource::record(1),
            MockSource::record(3),
            MockSource::record(2),
            MockSource::record(4),
        ];

        let all = reconcile(ResultSet::new(records.clone()), 100, &source);
        let ids: Vec<_> = all.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["rec-1", "rec-2", "rec-3", "rec-4"]);

        let limited = reconcile(ResultSet::new(records), 2, &source);
        assert_eq!(limited.len(), 2);
        assert_eq!(limited.records()[1]["id"], "rec-2");
    }

    #[test]
    fn test_reconcile_unknown_ids_collapse() {
        let source = MockSource::default();
        let records = vec![json!({"x": 1}), json!({"x": 2})];
        assert_eq!(reconcile(ResultSet::new(records), 10, &source).len(), 1);
    }

    #[test]
    fn test_reconcile_never_exceeds_limit_or_repeats() {
        let source = MockSource::default();
        for limit in [0, 1, 3, 7, 20] {
            let records: Vec<_> = (0..15).map(|n| MockSource::record(n % 6)).collect();
            let out = reconcile(ResultSet::new(records), limit, &source);
            assert!(out.len() <= limit);
            let ids: HashSet<_> = out.iter().map(|r| source.identifier(r)).collect();
            assert_eq!(ids.len(), out.len());
        }
    }

    #[tokio::test]
    async fn test_persist_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockSource::default();
        let mut with_html = MockSource::record(1);
        with_html["html"] = json!("https://example.org/1");
        let mut doi_like = MockSource::record(2);
        doi_like["id"] = json!("10.1000/xyz");
        let results = ResultSet::new(vec![with_html, doi_like]);

        let summary = persist(&results, &source, dir.path()).await.unwrap();

        assert_eq!(summary.record_files, 2);
        assert!(dir.path().join("mock_results.json").is_file());
        assert!(dir.path().join("rec-1").join("mock_result.json").is_file());
        assert!(dir.path().join("10.1000_xyz").join("mock_result.json").is_file());

        let urls = std::fs::read_to_string(summary.html_urls_file.unwrap()).unwrap();
        assert_eq!(urls, "https://example.org/1\n");

        let reloaded = load_previous_results(dir.path(), "mock").await.unwrap();
        assert_eq!(reloaded, results);
    }

    #[tokio::test]
    async fn test_no_html_urls_file_without_urls() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockSource::default();
        let results = ResultSet::new(vec![MockSource::record(1)]);

        let summary = persist(&results, &source, dir.path()).await.unwrap();
        assert!(summary.html_urls_file.is_none());
        assert!(!dir.path().join("mock_fulltext_html_urls.txt").exists());
    }

    #[tokio::test]
    async fn test_missing_restart_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_previous_results(dir.path(), "eupmc").await;
        assert!(matches!(result, Err(HarvestError::NoRestartFile(_))));
    }
}
