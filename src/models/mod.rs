//! Core data models for harvest runs.

mod download;
mod record;
mod search;

pub use download::{AssetKind, AssetLink, DownloadDescriptor};
pub use record::{IdKind, Identifier, Record, ResultSet};
pub use search::HarvestQuery;
