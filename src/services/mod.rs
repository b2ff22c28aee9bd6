//! Service layer for the crawler application.
//!
//! This module contains the crawl machinery:
//! - Paced, bounded, retrying fetches (`RateLimitedFetcher`)
//! - Layout-tolerant payload extraction (`PageExtractor`)
//! - Paginated single-level crawls (`FlatCrawler`)
//! - The platform → release → feature traversal (`HierarchicalCrawler`)

pub mod extract;
pub mod fetcher;
pub mod flat;
pub mod hierarchy;
pub mod staging;

#[cfg(test)]
pub(crate) mod testing;

pub use extract::{ExtractedPage, Item, PageExtractor};
pub use fetcher::{FetchRequest, FetcherStats, HttpTransport, Method, RateLimitedFetcher, Transport};
pub use flat::{FilterParams, FlatCrawler, FlatSource};
pub use hierarchy::HierarchicalCrawler;
pub use staging::Staging;
