//! Download descriptors consumed by the worker pool.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::utils::sanitize_path_component;

/// Kind of asset attached to a search result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Xml,
    Pdf,
    Supplementary,
    MinedTerms,
}

impl AssetKind {
    /// All kinds, in the order their download tasks run
    pub const ALL: [AssetKind; 4] = [
        AssetKind::Xml,
        AssetKind::Pdf,
        AssetKind::Supplementary,
        AssetKind::MinedTerms,
    ];

    /// Human-readable label used in log lines
    pub fn label(&self) -> &'static str {
        match self {
            AssetKind::Xml => "fulltext XML",
            AssetKind::Pdf => "fulltext PDF",
            AssetKind::Supplementary => "supplementary files",
            AssetKind::MinedTerms => "mined terms JSON",
        }
    }

    /// Default file name the asset is saved under
    pub fn default_filename(&self) -> &'static str {
        match self {
            AssetKind::Xml => "fulltext.xml",
            AssetKind::Pdf => "fulltext.pdf",
            AssetKind::Supplementary => "supplementaryFiles.zip",
            AssetKind::MinedTerms => "textMinedTerms.json",
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Where an asset lives, as extracted from a record by a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLink {
    pub url: String,
    pub id: String,
}

impl AssetLink {
    pub fn new(url: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            id: id.into(),
        }
    }
}

/// One queued download: fetch `url` into `<id>/<filename>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadDescriptor {
    pub url: String,
    pub id: String,
    pub kind: AssetKind,
    pub filename: String,
}

impl DownloadDescriptor {
    pub fn new(
        url: impl Into<String>,
        id: impl Into<String>,
        kind: AssetKind,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            id: id.into(),
            kind,
            filename: filename.into(),
        }
    }

    /// Build a queue from extracted links, all sharing a kind and file name
    pub fn queue_from_links(
        links: impl IntoIterator<Item = AssetLink>,
        kind: AssetKind,
        filename: &str,
    ) -> Vec<Self> {
        links
            .into_iter()
            .map(|link| Self::new(link.url, link.id, kind, filename))
            .collect()
    }

    /// Sanitized directory for this descriptor under `root`
    pub fn target_dir(&self, root: &Path) -> PathBuf {
        root.join(sanitize_path_component(&self.id.replace('/', "_")))
    }

    /// Sanitized file path for this descriptor under `root`
    pub fn target_path(&self, root: &Path) -> PathBuf {
        self.target_dir(root)
            .join(sanitize_path_component(&self.filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_path_is_sanitized() {
        let desc = DownloadDescriptor::new(
            "https://example.org/a",
            "../PMC1",
            AssetKind::Pdf,
            "full?text.pdf",
        );
        let path = desc.target_path(Path::new("/out"));
        assert_eq!(path, PathBuf::from("/out/.._PMC1/full_text.pdf"));
        assert!(path.starts_with("/out"));
    }

    #[test]
    fn test_queue_from_links() {
        let links = vec![
            AssetLink::new("https://a/1", "PMC1"),
            AssetLink::new("https://a/2", "PMC2"),
        ];
        let queue = DownloadDescriptor::queue_from_links(links, AssetKind::Xml, "fulltext.xml");
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[1].id, "PMC2");
        assert_eq!(queue[1].filename, "fulltext.xml");
        assert_eq!(queue[1].kind, AssetKind::Xml);
    }
}
