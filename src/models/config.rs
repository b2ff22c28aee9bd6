//! Application configuration structures.
//!
//! Every struct is immutable once loaded and composed into `Config`; the
//! crawlers receive the slice they need at construction time.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{DatasetType, PlatformType};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Request pacing, concurrency and retry behavior
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Feature identifier digest settings
    #[serde(default)]
    pub hashing: HashConfig,

    /// Snapshot store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Refresh scheduling settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Platform → release → feature catalog job
    #[serde(default)]
    pub features: FeatureJobConfig,

    /// EOL/EOS milestone job
    #[serde(default = "defaults::eol_job")]
    pub eol: FlatJobConfig,

    /// Field notice job
    #[serde(default = "defaults::field_notice_job")]
    pub field_notices: FlatJobConfig,

    /// Product listing job
    #[serde(default = "defaults::product_job")]
    pub products: FlatJobConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults. A file that exists but cannot be
    /// read or parsed is an error: malformed startup configuration is fatal.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::warn!("Config file {:?} not found. Using defaults.", path);
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.fill_default_urls();
        Ok(config)
    }

    /// A listing section given without `url` keeps its default endpoint.
    fn fill_default_urls(&mut self) {
        for (job, fallback) in [
            (&mut self.eol, defaults::eol_job()),
            (&mut self.field_notices, defaults::field_notice_job()),
            (&mut self.products, defaults::product_job()),
        ] {
            if job.url.trim().is_empty() {
                job.url = fallback.url;
            }
        }
    }

    /// Crawl job settings for a dataset.
    pub fn flat_job(&self, dataset: DatasetType) -> Option<&FlatJobConfig> {
        match dataset {
            DatasetType::Features => None,
            DatasetType::Eol => Some(&self.eol),
            DatasetType::FieldNotices => Some(&self.field_notices),
            DatasetType::Products => Some(&self.products),
        }
    }

    /// Minimum record count accepted at commit time for a dataset.
    pub fn min_records(&self, dataset: DatasetType) -> usize {
        match self.flat_job(dataset) {
            Some(job) => job.min_records,
            None => self.features.min_records,
        }
    }

    /// Refresh interval for a dataset.
    pub fn interval(&self, dataset: DatasetType) -> Duration {
        let secs = match self.flat_job(dataset) {
            Some(job) => job.interval_secs,
            None => self.features.interval_secs,
        };
        Duration::from_secs(secs)
    }

    /// Whether the dataset's job is enabled.
    pub fn is_enabled(&self, dataset: DatasetType) -> bool {
        match self.flat_job(dataset) {
            Some(job) => job.enabled,
            None => self.features.enabled,
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        let f = &self.fetcher;
        if f.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetcher.user_agent is empty"));
        }
        if f.timeout_secs == 0 {
            return Err(AppError::validation("fetcher.timeout_secs must be > 0"));
        }
        if f.max_concurrent == 0 {
            return Err(AppError::validation("fetcher.max_concurrent must be > 0"));
        }
        if f.max_attempts == 0 {
            return Err(AppError::validation("fetcher.max_attempts must be > 0"));
        }
        if f.backoff_base_ms > f.backoff_max_ms {
            return Err(AppError::validation(
                "fetcher.backoff_base_ms must not exceed fetcher.backoff_max_ms",
            ));
        }
        if !(3..=32).contains(&self.hashing.digest_bytes) {
            return Err(AppError::validation(
                "hashing.digest_bytes must be between 3 and 32",
            ));
        }
        if self.store.retain == 0 {
            return Err(AppError::validation("store.retain must be >= 1"));
        }
        if self.store.max_drop_percent > 100 {
            return Err(AppError::validation(
                "store.max_drop_percent must be between 0 and 100",
            ));
        }

        for dataset in DatasetType::ALL {
            if !self.is_enabled(dataset) {
                continue;
            }
            let interval = self.interval(dataset);
            if interval.is_zero() {
                return Err(AppError::validation(format!(
                    "{dataset}.interval_secs must be > 0"
                )));
            }
            if self.scheduler.retry_backoff() >= interval {
                return Err(AppError::validation(format!(
                    "scheduler.retry_backoff_secs must be shorter than {dataset}.interval_secs"
                )));
            }
        }

        if self.features.enabled {
            let job = &self.features;
            for (name, value) in [
                ("features.platforms_url", &job.platforms_url),
                ("features.releases_url", &job.releases_url),
                ("features.features_url", &job.features_url),
            ] {
                url::Url::parse(value)
                    .map_err(|e| AppError::validation(format!("{name} is invalid: {e}")))?;
            }
            if job.platform_types.is_empty() {
                return Err(AppError::validation("features.platform_types is empty"));
            }
            if job.page_size == 0 {
                return Err(AppError::validation("features.page_size must be > 0"));
            }
        }

        for dataset in [DatasetType::Eol, DatasetType::FieldNotices, DatasetType::Products] {
            let Some(job) = self.flat_job(dataset).filter(|j| j.enabled) else {
                continue;
            };
            url::Url::parse(&job.url)
                .map_err(|e| AppError::validation(format!("{dataset}.url is invalid: {e}")))?;
            if job.page_param.trim().is_empty() {
                return Err(AppError::validation(format!(
                    "{dataset}.page_param is empty"
                )));
            }
            if job.max_pages == 0 {
                return Err(AppError::validation(format!(
                    "{dataset}.max_pages must be > 0"
                )));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetcher: FetcherConfig::default(),
            hashing: HashConfig::default(),
            store: StoreConfig::default(),
            scheduler: SchedulerConfig::default(),
            features: FeatureJobConfig::default(),
            eol: defaults::eol_job(),
            field_notices: defaults::field_notice_job(),
            products: defaults::product_job(),
        }
    }
}

/// Request pacing, concurrency and retry settings shared by every crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Minimum gap between two dispatches, across all callers
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Maximum in-flight requests, across all callers
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Attempts per request including the first one
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// First retry delay; doubles per attempt
    #[serde(default = "defaults::backoff_base")]
    pub backoff_base_ms: u64,

    /// Upper bound of the exponential retry delay
    #[serde(default = "defaults::backoff_max")]
    pub backoff_max_ms: u64,

    /// Delay unit after a 429, multiplied by the attempt number
    #[serde(default = "defaults::rate_limit_backoff")]
    pub rate_limit_backoff_ms: u64,
}

impl FetcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Delay before retry number `attempt` (1-based) of an ordinary failure.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let ms = self.backoff_base_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(ms.min(self.backoff_max_ms))
    }

    /// Delay before retry number `attempt` (1-based) after a 429.
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(
            self.rate_limit_backoff_ms
                .saturating_mul(u64::from(attempt.max(1))),
        )
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_concurrent: defaults::max_concurrent(),
            max_attempts: defaults::max_attempts(),
            backoff_base_ms: defaults::backoff_base(),
            backoff_max_ms: defaults::backoff_max(),
            rate_limit_backoff_ms: defaults::rate_limit_backoff(),
        }
    }
}

/// Digest settings for feature identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashConfig {
    /// Bytes of SHA-256 kept; the hex id is twice as long
    #[serde(default = "defaults::digest_bytes")]
    pub digest_bytes: usize,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            digest_bytes: defaults::digest_bytes(),
        }
    }
}

/// Snapshot store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory of all dataset snapshots
    #[serde(default = "defaults::root_dir")]
    pub root_dir: PathBuf,

    /// Plain snapshots kept per dataset (the latest included)
    #[serde(default = "defaults::retain")]
    pub retain: usize,

    /// Compress snapshots beyond `retain` instead of deleting them
    #[serde(default = "defaults::archive_superseded")]
    pub archive_superseded: bool,

    /// Largest accepted drop in record count versus the previous snapshot
    #[serde(default = "defaults::max_drop_percent")]
    pub max_drop_percent: u8,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_dir: defaults::root_dir(),
            retain: defaults::retain(),
            archive_superseded: defaults::archive_superseded(),
            max_drop_percent: defaults::max_drop_percent(),
        }
    }
}

/// Refresh scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Delay before retrying a failed refresh
    #[serde(default = "defaults::retry_backoff")]
    pub retry_backoff_secs: u64,

    /// Start every enabled job immediately instead of after one interval
    #[serde(default = "defaults::run_on_start")]
    pub run_on_start: bool,
}

impl SchedulerConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            retry_backoff_secs: defaults::retry_backoff(),
            run_on_start: defaults::run_on_start(),
        }
    }
}

/// Platform → release → feature catalog job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureJobConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    #[serde(default = "defaults::feature_interval")]
    pub interval_secs: u64,

    /// Minimum catalog records for a commit to be accepted
    #[serde(default = "defaults::feature_min_records")]
    pub min_records: usize,

    /// Platform families to traverse
    #[serde(default = "defaults::platform_types")]
    pub platform_types: Vec<PlatformType>,

    #[serde(default = "defaults::platforms_url")]
    pub platforms_url: String,

    #[serde(default = "defaults::releases_url")]
    pub releases_url: String,

    #[serde(default = "defaults::features_url")]
    pub features_url: String,

    /// `limit` sent with each page request
    #[serde(default = "defaults::page_size")]
    pub page_size: usize,
}

impl Default for FeatureJobConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            interval_secs: defaults::feature_interval(),
            min_records: defaults::feature_min_records(),
            platform_types: defaults::platform_types(),
            platforms_url: defaults::platforms_url(),
            releases_url: defaults::releases_url(),
            features_url: defaults::features_url(),
            page_size: defaults::page_size(),
        }
    }
}

/// A paginated markup dataset (EOL, field notices, product listings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatJobConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    #[serde(default = "defaults::flat_interval")]
    pub interval_secs: u64,

    /// Minimum records for a commit to be accepted
    #[serde(default = "defaults::flat_min_records")]
    pub min_records: usize,

    /// Listing endpoint
    #[serde(default)]
    pub url: String,

    /// Query parameter carrying the page number
    #[serde(default = "defaults::page_param")]
    pub page_param: String,

    /// Hard stop for runaway pagination
    #[serde(default = "defaults::max_pages")]
    pub max_pages: u32,

    /// Filter sets; each one is crawled as its own branch.
    /// An empty list crawls the source once without filters.
    #[serde(default)]
    pub queries: Vec<BTreeMap<String, String>>,

    /// Fetch the detail pages (bulletins, notices) a listing links to
    #[serde(default = "defaults::enabled")]
    pub follow_details: bool,

    /// Cap on detail pages fetched per query
    #[serde(default = "defaults::max_details")]
    pub max_details: usize,
}

impl FlatJobConfig {
    fn with_url(url: &str) -> Self {
        Self {
            enabled: defaults::enabled(),
            interval_secs: defaults::flat_interval(),
            min_records: defaults::flat_min_records(),
            url: url.to_string(),
            page_param: defaults::page_param(),
            max_pages: defaults::max_pages(),
            queries: Vec::new(),
            follow_details: defaults::enabled(),
            max_details: defaults::max_details(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::FlatJobConfig;
    use crate::models::PlatformType;

    // Fetcher defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; lifecycle-crawler/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        1000
    }
    pub fn max_concurrent() -> usize {
        5
    }
    pub fn max_attempts() -> u32 {
        5
    }
    pub fn backoff_base() -> u64 {
        500
    }
    pub fn backoff_max() -> u64 {
        30_000
    }
    pub fn rate_limit_backoff() -> u64 {
        60_000
    }

    // Hashing defaults
    pub fn digest_bytes() -> usize {
        8
    }

    // Store defaults
    pub fn root_dir() -> PathBuf {
        PathBuf::from("data")
    }
    pub fn retain() -> usize {
        5
    }
    pub fn archive_superseded() -> bool {
        true
    }
    pub fn max_drop_percent() -> u8 {
        50
    }

    // Scheduler defaults
    pub fn retry_backoff() -> u64 {
        300
    }
    pub fn run_on_start() -> bool {
        true
    }

    // Job defaults
    pub fn enabled() -> bool {
        true
    }
    pub fn feature_interval() -> u64 {
        24 * 60 * 60
    }
    pub fn flat_interval() -> u64 {
        60 * 60
    }
    pub fn feature_min_records() -> usize {
        1
    }
    pub fn flat_min_records() -> usize {
        1
    }
    pub fn platform_types() -> Vec<PlatformType> {
        PlatformType::ALL.to_vec()
    }
    pub fn platforms_url() -> String {
        "https://cfnngws.cisco.com/api/v1/platform".into()
    }
    pub fn releases_url() -> String {
        "https://cfnngws.cisco.com/api/v1/release".into()
    }
    pub fn features_url() -> String {
        "https://cfnngws.cisco.com/api/v1/by_product_result".into()
    }
    pub fn page_size() -> usize {
        100
    }
    pub fn page_param() -> String {
        "page".into()
    }
    pub fn max_pages() -> u32 {
        500
    }
    pub fn max_details() -> usize {
        500
    }

    pub fn eol_job() -> FlatJobConfig {
        FlatJobConfig::with_url("https://www.cisco.com/c/en/us/products/eos-eol-listing.html")
    }
    pub fn field_notice_job() -> FlatJobConfig {
        FlatJobConfig::with_url(
            "https://www.cisco.com/c/en/us/support/web/field-notice-overview.html",
        )
    }
    pub fn product_job() -> FlatJobConfig {
        FlatJobConfig::with_url("https://www.cisco.com/c/en/us/support/index.html")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.fetcher.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.fetcher.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_retry_backoff_longer_than_interval() {
        let mut config = Config::default();
        config.eol.interval_secs = 60;
        config.scheduler.retry_backoff_secs = 120;
        assert!(config.validate().is_err());

        config.eol.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_digest_out_of_range() {
        let mut config = Config::default();
        config.hashing.digest_bytes = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [fetcher]
            max_concurrent = 2

            [eol]
            url = "https://example.com/eol"
            queries = [{ software_type = "IOS", software_version = "15.1" }]
            "#,
        )
        .unwrap();

        assert_eq!(config.fetcher.max_concurrent, 2);
        assert_eq!(config.fetcher.max_attempts, 5);
        assert_eq!(config.eol.page_param, "page");
        assert_eq!(config.eol.queries.len(), 1);
        assert_eq!(config.field_notices.max_pages, 500);
        assert!(config.field_notices.follow_details);
        assert_eq!(config.eol.max_details, 500);
        assert_eq!(config.features.platform_types.len(), 5);
    }

    #[test]
    fn retry_delay_doubles_and_caps() {
        let fetcher = FetcherConfig {
            backoff_base_ms: 100,
            backoff_max_ms: 350,
            ..FetcherConfig::default()
        };
        assert_eq!(fetcher.retry_delay(1), Duration::from_millis(100));
        assert_eq!(fetcher.retry_delay(2), Duration::from_millis(200));
        assert_eq!(fetcher.retry_delay(3), Duration::from_millis(350));
        assert_eq!(fetcher.retry_delay(30), Duration::from_millis(350));
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = Config::load(tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.store.retain, 5);
    }

    #[test]
    fn load_malformed_file_is_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[fetcher\nmax_concurrent = ").unwrap();
        assert!(matches!(Config::load(&path), Err(AppError::Toml(_))));
    }
}
