// src/models/mod.rs

//! Domain models for the lifecycle crawler.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod catalog;
mod config;
mod lifecycle;
mod record;
mod snapshot;

// Re-export all public types
pub use catalog::{Feature, Platform, PlatformType, Release};
pub use config::{
    Config, FeatureJobConfig, FetcherConfig, FlatJobConfig, HashConfig, SchedulerConfig,
    StoreConfig,
};
pub use lifecycle::{EolRecord, FieldNotice, ProductListing, Revision, SoftwareScope, SoftwareType};
pub use record::{DatasetType, Record, SourceKind};
pub use snapshot::{BranchStatus, CrawlOutcome, CrawlReport, ErrorTally, Snapshot, SnapshotMeta};
