// src/pipeline/refresh.rs

//! Refresh jobs: one crawl per dataset, committed as one snapshot.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{Config, CrawlOutcome, DatasetType, SnapshotMeta};
use crate::services::{FilterParams, FlatCrawler, FlatSource, HierarchicalCrawler, RateLimitedFetcher};
use crate::storage::DatasetStore;

/// A crawl that produces the full record set of one dataset.
#[async_trait]
pub trait RefreshJob: Send + Sync {
    fn dataset(&self) -> DatasetType;

    /// Time between successful refreshes.
    fn interval(&self) -> Duration;

    async fn run(&self) -> Result<CrawlOutcome>;
}

/// Platform → release → feature catalog.
pub struct FeatureRefreshJob {
    crawler: HierarchicalCrawler,
    interval: Duration,
}

impl FeatureRefreshJob {
    pub fn new(fetcher: Arc<RateLimitedFetcher>, config: &Config) -> Self {
        Self {
            crawler: HierarchicalCrawler::new(
                fetcher,
                config.features.clone(),
                config.hashing.digest_bytes,
            ),
            interval: config.interval(DatasetType::Features),
        }
    }
}

#[async_trait]
impl RefreshJob for FeatureRefreshJob {
    fn dataset(&self) -> DatasetType {
        DatasetType::Features
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<CrawlOutcome> {
        self.crawler.crawl().await
    }
}

/// EOL, field notice or product listing source.
pub struct FlatRefreshJob {
    crawler: FlatCrawler,
    source: FlatSource,
    queries: Vec<FilterParams>,
    interval: Duration,
}

impl FlatRefreshJob {
    pub fn new(fetcher: Arc<RateLimitedFetcher>, dataset: DatasetType, config: &Config) -> Result<Self> {
        let job = config.flat_job(dataset).ok_or_else(|| {
            AppError::config(format!("{dataset} is not a paginated listing source"))
        })?;
        Ok(Self {
            crawler: FlatCrawler::new(fetcher),
            source: FlatSource::from_job(dataset, job)?,
            queries: job.queries.clone(),
            interval: config.interval(dataset),
        })
    }
}

#[async_trait]
impl RefreshJob for FlatRefreshJob {
    fn dataset(&self) -> DatasetType {
        self.source.dataset
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<CrawlOutcome> {
        self.crawler.crawl_all(&self.source, &self.queries).await
    }
}

/// Build the job for one dataset, sharing `fetcher` with every other job.
pub fn build_job(
    config: &Config,
    fetcher: Arc<RateLimitedFetcher>,
    dataset: DatasetType,
) -> Result<Arc<dyn RefreshJob>> {
    Ok(match dataset {
        DatasetType::Features => Arc::new(FeatureRefreshJob::new(fetcher, config)),
        _ => Arc::new(FlatRefreshJob::new(fetcher, dataset, config)?),
    })
}

/// Jobs for every enabled dataset.
pub fn build_jobs(config: &Config, fetcher: Arc<RateLimitedFetcher>) -> Result<Vec<Arc<dyn RefreshJob>>> {
    DatasetType::ALL
        .into_iter()
        .filter(|dataset| config.is_enabled(*dataset))
        .map(|dataset| build_job(config, Arc::clone(&fetcher), dataset))
        .collect()
}

/// Commit a finished crawl. Incomplete branches travel in the report.
pub async fn commit_outcome(
    store: &dyn DatasetStore,
    dataset: DatasetType,
    outcome: CrawlOutcome,
) -> Result<SnapshotMeta> {
    let incomplete: Vec<&str> = outcome
        .report
        .incomplete_branches()
        .map(|b| b.branch.as_str())
        .collect();
    if !incomplete.is_empty() {
        log::warn!(
            "{} crawl finished with {} incomplete branch(es): {}",
            dataset,
            incomplete.len(),
            incomplete.join(", ")
        );
    }
    store.commit(dataset, outcome.records, outcome.report).await
}

/// Crawl then commit, once.
pub async fn run_refresh(job: &dyn RefreshJob, store: &dyn DatasetStore) -> Result<SnapshotMeta> {
    let dataset = job.dataset();
    log::info!("Refreshing {}", dataset);
    let outcome = job.run().await?;
    log::info!(
        "{} crawl collected {} records from {} pages",
        dataset,
        outcome.records.len(),
        outcome.report.pages_fetched
    );
    commit_outcome(store, dataset, outcome).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CrawlReport, EolRecord, Record};
    use crate::services::testing::MockTransport;
    use crate::services::FetchRequest;
    use crate::storage::LocalStore;
    use tempfile::TempDir;

    const LISTING: &str = r#"
        <table class="eol-listing">
          <tr><th>Product ID</th><th>End-of-Sale Date</th></tr>
          <tr><td>WS-C2960X-24TS-L</td><td>October 30, 2022</td></tr>
          <tr><td>WS-C2960X-48TS-L</td><td>October 30, 2022</td></tr>
        </table>"#;

    fn config(tmp: &TempDir) -> Config {
        let mut config = Config::default();
        config.store.root_dir = tmp.path().to_path_buf();
        config.eol.url = "https://www.example.com/eol".into();
        config
    }

    #[test]
    fn test_build_jobs_skips_disabled() {
        let tmp = TempDir::new().unwrap();
        let mut config = config(&tmp);
        config.products.enabled = false;
        let fetcher = Arc::new(RateLimitedFetcher::new(
            Arc::new(MockTransport::new()),
            config.fetcher.clone(),
        ));

        let datasets: Vec<_> = build_jobs(&config, fetcher)
            .unwrap()
            .iter()
            .map(|j| j.dataset())
            .collect();
        assert_eq!(
            datasets,
            vec![DatasetType::Features, DatasetType::Eol, DatasetType::FieldNotices]
        );
    }

    #[tokio::test]
    async fn test_run_refresh_commits_listing() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        let transport = Arc::new(MockTransport::new());
        transport.push(
            &FetchRequest::get("https://www.example.com/eol").with_query("page", "1"),
            Ok(LISTING.to_string()),
        );
        let fetcher = Arc::new(RateLimitedFetcher::new(transport, config.fetcher.clone()));
        let job = build_job(&config, fetcher, DatasetType::Eol).unwrap();

        let store = LocalStore::from_config(&config).await.unwrap();
        let meta = run_refresh(job.as_ref(), &store).await.unwrap();

        assert_eq!(meta.record_count, 2);
        assert_eq!(meta.version, 1);
        assert!(meta.complete);
    }

    #[tokio::test]
    async fn test_commit_outcome_keeps_report() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::from_config(&config(&tmp)).await.unwrap();
        let mut report = CrawlReport::new(DatasetType::Eol);
        report.incomplete_branch("query:all", "HTTP status 503");
        let outcome = CrawlOutcome {
            records: vec![Record::Eol(EolRecord::new("WS-C3560-24TS-S"))],
            report,
        };

        let meta = commit_outcome(&store, DatasetType::Eol, outcome).await.unwrap();
        assert!(!meta.complete);
        assert_eq!(meta.report.branches[0].detail.as_deref(), Some("HTTP status 503"));
    }
}
