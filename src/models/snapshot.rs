// src/models/snapshot.rs

//! Crawl reports and committed dataset snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, FetchError};
use crate::models::{DatasetType, Record};

/// Outcome of one branch of a crawl (a query, a platform, a release pair).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchStatus {
    pub branch: String,
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Error counts by kind for one crawl run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorTally {
    pub timeout: usize,
    pub network: usize,
    pub http_status: usize,
    pub rate_limited: usize,
    pub extraction: usize,
    pub integrity: usize,
}

impl ErrorTally {
    /// Count a fetch failure that exhausted its retry budget.
    pub fn record_fetch(&mut self, error: &FetchError) {
        match error {
            FetchError::Timeout => self.timeout += 1,
            FetchError::Network(_) => self.network += 1,
            FetchError::HttpStatus(_) => self.http_status += 1,
            FetchError::RateLimited => self.rate_limited += 1,
        }
    }

    /// Count any pipeline error.
    pub fn record(&mut self, error: &AppError) {
        match error {
            AppError::Fetch(e) => self.record_fetch(e),
            AppError::Extraction(_) => self.extraction += 1,
            AppError::Integrity { .. } => self.integrity += 1,
            _ => self.network += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.timeout
            + self.network
            + self.http_status
            + self.rate_limited
            + self.extraction
            + self.integrity
    }

    pub fn merge(&mut self, other: &ErrorTally) {
        self.timeout += other.timeout;
        self.network += other.network;
        self.http_status += other.http_status;
        self.rate_limited += other.rate_limited;
        self.extraction += other.extraction;
        self.integrity += other.integrity;
    }
}

/// Per-run completeness and error summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlReport {
    pub dataset: DatasetType,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub branches: Vec<BranchStatus>,
    #[serde(default)]
    pub errors: ErrorTally,
    #[serde(default)]
    pub pages_fetched: usize,
}

impl CrawlReport {
    pub fn new(dataset: DatasetType) -> Self {
        Self {
            dataset,
            started_at: Utc::now(),
            finished_at: None,
            branches: Vec::new(),
            errors: ErrorTally::default(),
            pages_fetched: 0,
        }
    }

    pub fn complete_branch(&mut self, branch: impl Into<String>) {
        self.branches.push(BranchStatus {
            branch: branch.into(),
            complete: true,
            detail: None,
        });
    }

    pub fn incomplete_branch(&mut self, branch: impl Into<String>, detail: impl Into<String>) {
        let branch = branch.into();
        let detail = detail.into();
        log::warn!("Branch {} marked incomplete: {}", branch, detail);
        self.branches.push(BranchStatus {
            branch,
            complete: false,
            detail: Some(detail),
        });
    }

    /// Close a branch: complete when nothing went wrong, otherwise
    /// incomplete with every problem in the detail.
    pub fn end_branch(&mut self, branch: impl Into<String>, problems: Vec<String>) {
        if problems.is_empty() {
            self.complete_branch(branch);
        } else {
            self.incomplete_branch(branch, problems.join("; "));
        }
    }

    /// True when every attempted branch completed.
    pub fn is_complete(&self) -> bool {
        self.branches.iter().all(|b| b.complete)
    }

    pub fn incomplete_branches(&self) -> impl Iterator<Item = &BranchStatus> {
        self.branches.iter().filter(|b| !b.complete)
    }

    /// Fold another report of the same run into this one.
    pub fn merge(&mut self, other: CrawlReport) {
        self.branches.extend(other.branches);
        self.errors.merge(&other.errors);
        self.pages_fetched += other.pages_fetched;
    }

    /// Stamp the end time and order branches deterministically.
    pub fn finish(&mut self) {
        self.branches.sort_by(|a, b| a.branch.cmp(&b.branch));
        self.finished_at = Some(Utc::now());
    }
}

/// Records plus report produced by one crawl run, before commit.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub records: Vec<Record>,
    pub report: CrawlReport,
}

/// Metadata of a committed snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub dataset: DatasetType,
    pub version: u64,
    pub committed_at: DateTime<Utc>,
    /// SHA-256 hex of the canonical record list
    pub checksum: String,
    pub record_count: usize,
    /// False when any crawl branch was incomplete
    pub complete: bool,
    pub report: CrawlReport,
}

/// An immutable committed dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub records: Vec<Record>,
}

impl Snapshot {
    pub fn dataset(&self) -> DatasetType {
        self.meta.dataset
    }

    pub fn version(&self) -> u64 {
        self.meta.version
    }
}
