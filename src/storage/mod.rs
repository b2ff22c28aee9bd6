//! Storage abstractions for dataset snapshots.
//!
//! Every commit produces an immutable, versioned snapshot. A small pointer
//! file names the latest validated version per dataset; readers only ever
//! follow the pointer, so a snapshot is either fully visible or not at all.
//!
//! ## Directory Structure
//!
//! ```text
//! {root}/
//! └── eol/
//!     ├── LATEST.json              # pointer: version, checksum, file
//!     ├── snapshots/
//!     │   ├── v00000007.json
//!     │   └── v00000008.json
//!     └── archive/
//!         └── v00000001.json.zst   # superseded, zstd-compressed
//! ```

pub mod local;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{CrawlReport, DatasetType, Record, Snapshot, SnapshotMeta};

// Re-export for convenience
pub use local::LocalStore;

/// Contents of `LATEST.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestPointer {
    pub version: u64,
    pub checksum: String,
    /// Snapshot file relative to the dataset directory
    pub file: String,
    pub committed_at: DateTime<Utc>,
}

/// One retained version of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub version: u64,
    /// Stored compressed under `archive/`
    pub archived: bool,
}

/// Trait for snapshot storage backends.
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Validate `records` and publish them as the next version of `dataset`.
    ///
    /// On rejection the previous snapshot stays the latest.
    async fn commit(
        &self,
        dataset: DatasetType,
        records: Vec<Record>,
        report: CrawlReport,
    ) -> Result<SnapshotMeta>;

    /// Latest validated snapshot, if one was ever committed.
    async fn read(&self, dataset: DatasetType) -> Result<Option<Arc<Snapshot>>>;

    /// Retained and archived versions, oldest first.
    async fn history(&self, dataset: DatasetType) -> Result<Vec<HistoryEntry>>;
}
