//! End-to-end: scripted upstream → crawl → commit → query.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;

use lifecycle_crawler::error::FetchError;
use lifecycle_crawler::models::{Config, DatasetType, PlatformType, Record};
use lifecycle_crawler::pipeline::{DatasetQuery, Pagination, build_job, list, run_refresh};
use lifecycle_crawler::services::{FetchRequest, Method, RateLimitedFetcher, Transport};
use lifecycle_crawler::storage::{DatasetStore, LocalStore};

const PLATFORMS: &str = "https://api.example.test/platform";
const RELEASES: &str = "https://api.example.test/release";
const FEATURES: &str = "https://api.example.test/features";
const EOL: &str = "https://www.example.test/eol";

const EOL_LISTING: &str = r#"
<html><body>
  <table class="eol-listing">
    <tr><th>Product ID</th><th>End-of-Sale Date</th><th>Last Date of Support</th></tr>
    <tr><td>WS-C2960X-24TS-L</td><td>October 30, 2022</td><td>October 31, 2027</td></tr>
    <tr><td>WS-C2960X-48TS-L</td><td>October 30, 2022</td><td>October 31, 2027</td></tr>
  </table>
</body></html>"#;

/// Catalog of one switch (id 1) with releases 10 and 11.
struct Upstream {
    /// Release whose feature listing answers 404
    broken_release: Option<u64>,
    calls: AtomicUsize,
}

impl Upstream {
    fn new(broken_release: Option<u64>) -> Arc<Self> {
        Arc::new(Self {
            broken_release,
            calls: AtomicUsize::new(0),
        })
    }
}

fn field(body: &Value, key: &str) -> Option<u64> {
    body.get(key).and_then(Value::as_u64)
}

#[async_trait]
impl Transport for Upstream {
    async fn execute(&self, request: &FetchRequest) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.method == Method::Get {
            let page = request
                .query
                .iter()
                .find(|(k, _)| k == "page")
                .map(|(_, v)| v.as_str());
            return match (request.url.as_str(), page) {
                (EOL, Some("1")) => Ok(EOL_LISTING.to_string()),
                _ => Err(FetchError::HttpStatus(404)),
            };
        }

        let body = request.body.clone().unwrap_or(Value::Null);
        let page = field(&body, "page").unwrap_or(1);
        if page > 1 {
            return Ok("[]".to_string());
        }
        let payload = match request.url.as_str() {
            PLATFORMS => json!([{ "platform_id": 1, "platform_name": "Catalyst 9300" }]),
            RELEASES if field(&body, "platform_id") == Some(1) => json!({
                "data": [
                    { "release_id": 10, "release_name": "17.9.4" },
                    { "release_id": 11, "release_name": "17.12.1" }
                ]
            }),
            FEATURES => match field(&body, "release_id") {
                Some(id) if Some(id) == self.broken_release => {
                    return Err(FetchError::HttpStatus(404));
                }
                Some(10) => json!([
                    {
                        "feature_name": "QoS",
                        "feature_desc": "Quality of Service",
                        "feature_set_desc": "Network Essentials"
                    },
                    { "feature_name": "VLAN" }
                ]),
                Some(11) => json!([{ "feature_name": "QoS" }]),
                _ => json!([]),
            },
            _ => return Err(FetchError::HttpStatus(404)),
        };
        Ok(payload.to_string())
    }
}

fn config(tmp: &TempDir) -> Config {
    let mut config = Config::default();
    config.fetcher.request_delay_ms = 0;
    config.fetcher.max_attempts = 1;
    config.store.root_dir = tmp.path().to_path_buf();
    config.features.platform_types = vec![PlatformType::Switches];
    config.features.platforms_url = PLATFORMS.into();
    config.features.releases_url = RELEASES.into();
    config.features.features_url = FEATURES.into();
    config.eol.url = EOL.into();
    config
}

fn fetcher(config: &Config, upstream: Arc<Upstream>) -> Arc<RateLimitedFetcher> {
    Arc::new(RateLimitedFetcher::new(upstream, config.fetcher.clone()))
}

#[tokio::test]
async fn feature_catalog_refresh_is_idempotent_and_queryable() {
    let tmp = TempDir::new().unwrap();
    let config = config(&tmp);
    let store = LocalStore::from_config(&config).await.unwrap();
    let job = build_job(&config, fetcher(&config, Upstream::new(None)), DatasetType::Features).unwrap();

    let first = run_refresh(job.as_ref(), &store).await.unwrap();
    assert_eq!(first.version, 1);
    // 1 platform + 2 releases + 3 features
    assert_eq!(first.record_count, 6);
    assert!(first.complete);

    let second = run_refresh(job.as_ref(), &store).await.unwrap();
    assert_eq!(second.version, 2);
    assert_eq!(second.checksum, first.checksum);

    let features = list(
        &store,
        &DatasetQuery::Features {
            platform_id: "1".into(),
            release_id: "10".into(),
        },
        Pagination::default(),
    )
    .await
    .unwrap();
    assert_eq!(features.total_items, 2);
    let names: Vec<_> = features
        .items
        .iter()
        .filter_map(|r| match r {
            Record::Feature(f) => Some(f.name.as_str()),
            _ => None,
        })
        .collect();
    assert!(names.contains(&"QoS") && names.contains(&"VLAN"));

    let releases = list(
        &store,
        &DatasetQuery::Releases {
            platform_id: "1".into(),
        },
        Pagination::new(1, 1).unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(releases.items.len(), 1);
    assert_eq!(releases.total_pages, 2);
    assert!(releases.has_more);

    let switches = list(
        &store,
        &DatasetQuery::Platforms {
            by_name: None,
            platform_type: Some(PlatformType::Switches),
        },
        Pagination::default(),
    )
    .await
    .unwrap();
    assert_eq!(switches.total_items, 1);
}

#[tokio::test]
async fn failed_branch_still_commits_with_incomplete_flag() {
    let tmp = TempDir::new().unwrap();
    let config = config(&tmp);
    let store = LocalStore::from_config(&config).await.unwrap();
    let job = build_job(
        &config,
        fetcher(&config, Upstream::new(Some(11))),
        DatasetType::Features,
    )
    .unwrap();

    let meta = run_refresh(job.as_ref(), &store).await.unwrap();
    assert!(!meta.complete);
    // release 11 has no features but its sibling is intact
    assert_eq!(meta.record_count, 5);

    let reopened = LocalStore::from_config(&config).await.unwrap();
    let snapshot = reopened.read(DatasetType::Features).await.unwrap().unwrap();
    let incomplete: Vec<_> = snapshot
        .meta
        .report
        .incomplete_branches()
        .map(|b| b.branch.clone())
        .collect();
    assert_eq!(incomplete.len(), 1);
    assert!(incomplete[0].contains("11"));
}

#[tokio::test]
async fn eol_listing_refresh_and_hardware_query() {
    let tmp = TempDir::new().unwrap();
    let config = config(&tmp);
    let store = LocalStore::from_config(&config).await.unwrap();
    let upstream = Upstream::new(None);
    let job = build_job(&config, fetcher(&config, Arc::clone(&upstream)), DatasetType::Eol).unwrap();

    let meta = run_refresh(job.as_ref(), &store).await.unwrap();
    assert_eq!(meta.record_count, 2);
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);

    let page = list(
        &store,
        &DatasetQuery::EolByHardware {
            product_id: "ws-c2960x-48ts-l".into(),
        },
        Pagination::default(),
    )
    .await
    .unwrap();
    assert_eq!(page.total_items, 1);
    let Record::Eol(record) = &page.items[0] else {
        panic!("expected an EOL record");
    };
    assert_eq!(
        record.milestones.get("end_of_sale").map(String::as_str),
        Some("2022-10-30")
    );
    assert_eq!(
        record.milestones.get("last_date_of_support").map(String::as_str),
        Some("2027-10-31")
    );
}
