//! # getpapers
//!
//! Harvest search results, metadata and fulltext assets from academic
//! literature APIs (EuropePMC, arXiv, CrossRef and IEEE Xplore).
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Core data structures (Identifier, ResultSet, DownloadDescriptor, etc.)
//! - [`sources`]: Source adapters behind the trait-based paging interface
//! - [`harvest`]: Paginator, result reconciler, download worker pool and task sequencer
//! - [`utils`]: HTTP client, retry with backoff and path sanitization
//! - [`config`]: Configuration management
//! - [`ui`]: Progress bars and terminal summaries

pub mod config;
pub mod harvest;
pub mod models;
pub mod sources;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use harvest::{HarvestError, HarvestOutcome, Harvester};
pub use models::{HarvestQuery, ResultSet};
pub use sources::{Source, SourceRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
