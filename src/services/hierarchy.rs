// src/services/hierarchy.rs

//! Platform → release → feature catalog crawl.
//!
//! A run walks three phases. Platforms are listed per platform type, then
//! releases per platform, then features per (platform, release) pair. Work
//! inside a phase fans out across the fetcher's concurrency cap, while the
//! pages of any single listing are fetched strictly in order. A branch that
//! exhausts its retries is recorded as incomplete and its siblings carry on.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};

use crate::error::{AppError, Result};
use crate::models::{
    CrawlOutcome, CrawlReport, DatasetType, Feature, FeatureJobConfig, Platform, PlatformType,
    Record, Release, SourceKind,
};
use crate::services::extract::{Item, PageExtractor};
use crate::services::fetcher::{FetchRequest, RateLimitedFetcher};
use crate::services::staging::Staging;

/// Hard stop for a single catalog listing.
const MAX_CATALOG_PAGES: u32 = 1_000;

/// Consecutive unextractable pages after which a listing gives up.
const MAX_CONSECUTIVE_EXTRACTION_FAILURES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    FetchPlatforms,
    FetchReleases,
    FetchFeatures,
    Done,
}

type PairKey = (String, String);

/// Per-run staging arena, indexed by platform and (platform, release).
#[derive(Debug)]
struct CatalogArena {
    platforms: BTreeMap<String, Platform>,
    releases: BTreeMap<PairKey, Release>,
    features: BTreeMap<PairKey, BTreeMap<String, Feature>>,
    report: CrawlReport,
}

impl CatalogArena {
    fn new() -> Self {
        Self {
            platforms: BTreeMap::new(),
            releases: BTreeMap::new(),
            features: BTreeMap::new(),
            report: CrawlReport::new(DatasetType::Features),
        }
    }

    /// Flatten into key-ordered records.
    fn into_outcome(self) -> Result<CrawlOutcome> {
        let mut staging = Staging::new();
        for platform in self.platforms.into_values() {
            staging.insert(Record::Platform(platform))?;
        }
        for release in self.releases.into_values() {
            staging.insert(Record::Release(release))?;
        }
        for feature in self.features.into_values().flat_map(BTreeMap::into_values) {
            staging.insert(Record::Feature(feature))?;
        }
        let mut report = self.report;
        report.finish();
        Ok(CrawlOutcome {
            records: staging.into_records(),
            report,
        })
    }
}

/// Stage a platform; a second listing under another type coalesces.
fn add_platform(platforms: &mut BTreeMap<String, Platform>, platform: Platform) -> Result<()> {
    match platforms.get(&platform.id) {
        Some(existing) if existing.name == platform.name => {
            if existing.platform_type != platform.platform_type {
                log::debug!(
                    "Platform {} listed under {} and {}, keeping {}",
                    platform.id,
                    existing.platform_type,
                    platform.platform_type,
                    existing.platform_type
                );
            }
            Ok(())
        }
        Some(existing) => Err(AppError::integrity(
            format!("platform:{}", platform.id),
            format!(
                "listed as '{}' under {} and '{}' under {}",
                existing.name, existing.platform_type, platform.name, platform.platform_type
            ),
        )),
        None => {
            platforms.insert(platform.id.clone(), platform);
            Ok(())
        }
    }
}

fn add_release(releases: &mut BTreeMap<PairKey, Release>, release: Release) -> Result<()> {
    let key = (release.platform_id.clone(), release.id.clone());
    match releases.get(&key) {
        Some(existing) if *existing == release => Ok(()),
        Some(existing) => Err(AppError::integrity(
            format!("release:{}:{}", key.0, key.1),
            format!("listed as both '{}' and '{}'", existing.version, release.version),
        )),
        None => {
            releases.insert(key, release);
            Ok(())
        }
    }
}

/// Run `attempt` again once if it fails with an integrity fault.
async fn retry_integrity<T, F, Fut>(what: &str, attempt: F) -> Result<(T, CrawlReport)>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(T, CrawlReport)>>,
{
    match attempt().await {
        Err(err) if err.is_integrity() => {
            log::warn!("Re-fetching {} after integrity fault: {}", what, err);
            let (value, mut report) = attempt().await?;
            report.errors.integrity += 1;
            Ok((value, report))
        }
        other => other,
    }
}

/// Crawler for the feature catalog.
pub struct HierarchicalCrawler {
    fetcher: Arc<RateLimitedFetcher>,
    extractor: PageExtractor,
    job: FeatureJobConfig,
    digest_bytes: usize,
}

impl HierarchicalCrawler {
    pub fn new(fetcher: Arc<RateLimitedFetcher>, job: FeatureJobConfig, digest_bytes: usize) -> Self {
        Self {
            fetcher,
            extractor: PageExtractor::new(),
            job,
            digest_bytes,
        }
    }

    /// Run the traversal until every branch has been attempted.
    pub async fn crawl(&self) -> Result<CrawlOutcome> {
        let mut arena = CatalogArena::new();
        let mut phase = Phase::FetchPlatforms;

        while phase != Phase::Done {
            log::debug!("Feature crawl entering {:?}", phase);
            phase = match phase {
                Phase::FetchPlatforms => {
                    self.fetch_platforms(&mut arena).await?;
                    Phase::FetchReleases
                }
                Phase::FetchReleases => {
                    self.fetch_releases(&mut arena).await?;
                    Phase::FetchFeatures
                }
                Phase::FetchFeatures => {
                    self.fetch_features(&mut arena).await?;
                    Phase::Done
                }
                Phase::Done => Phase::Done,
            };
        }

        log::info!(
            "Feature crawl finished: {} platforms, {} releases, {} incomplete branch(es)",
            arena.platforms.len(),
            arena.releases.len(),
            arena.report.incomplete_branches().count()
        );
        arena.into_outcome()
    }

    fn concurrency(&self) -> usize {
        self.fetcher.config().max_concurrent.max(1)
    }

    async fn fetch_platforms(&self, arena: &mut CatalogArena) -> Result<()> {
        let (platforms, report) = retry_integrity("platform listings", || self.list_platforms()).await?;
        arena.report.merge(report);
        arena.platforms = platforms;
        Ok(())
    }

    async fn list_platforms(&self) -> Result<(BTreeMap<String, Platform>, CrawlReport)> {
        let mut results: Vec<_> = stream::iter(self.job.platform_types.iter().copied())
            .map(|platform_type| async move {
                let branch = format!("platforms:{platform_type}");
                let (items, report) = self
                    .paginate(&branch, SourceKind::PlatformList, |page| {
                        self.platform_request(platform_type, page)
                    })
                    .await;
                (platform_type, items, report)
            })
            .buffer_unordered(self.concurrency())
            .collect()
            .await;
        results.sort_by_key(|(platform_type, _, _)| *platform_type);

        let mut platforms = BTreeMap::new();
        let mut merged = CrawlReport::new(DatasetType::Features);
        for (platform_type, items, report) in results {
            merged.merge(report);
            for item in items {
                if let Item::Platform(entry) = item {
                    add_platform(
                        &mut platforms,
                        Platform {
                            id: entry.id,
                            name: entry.name,
                            platform_type,
                        },
                    )?;
                }
            }
        }
        Ok((platforms, merged))
    }

    async fn fetch_releases(&self, arena: &mut CatalogArena) -> Result<()> {
        let platforms: Vec<Platform> = arena.platforms.values().cloned().collect();
        let (releases, report) =
            retry_integrity("release listings", || self.list_releases(&platforms)).await?;
        arena.report.merge(report);
        arena.releases = releases;
        Ok(())
    }

    async fn list_releases<'p>(&self, platforms: &'p [Platform]) -> Result<(BTreeMap<PairKey, Release>, CrawlReport)> {
        let results: Vec<_> = stream::iter(platforms)
            .map(|platform: &'p Platform| async move {
                let branch = format!("platform:{}", platform.id);
                let (items, report) = self
                    .paginate(&branch, SourceKind::ReleaseList, |page| {
                        self.release_request(platform, page)
                    })
                    .await;
                (platform, items, report)
            }
            .boxed())
            .boxed()
            .buffer_unordered(self.concurrency())
            .collect()
            .await;

        let mut releases = BTreeMap::new();
        let mut merged = CrawlReport::new(DatasetType::Features);
        for (platform, items, report) in results {
            merged.merge(report);
            for item in items {
                if let Item::Release(entry) = item {
                    add_release(
                        &mut releases,
                        Release {
                            id: entry.id,
                            platform_id: platform.id.clone(),
                            version: entry.version,
                        },
                    )?;
                }
            }
        }
        Ok((releases, merged))
    }

    async fn fetch_features(&self, arena: &mut CatalogArena) -> Result<()> {
        let pairs: Vec<(Platform, Release)> = arena
            .releases
            .values()
            .filter_map(|release| {
                let platform = arena.platforms.get(&release.platform_id)?;
                Some((platform.clone(), release.clone()))
            })
            .collect();

        let results: Vec<_> = stream::iter(pairs)
            .map(|(platform, release)| async move {
                let what = format!("platform {} release {}", platform.id, release.id);
                let result = retry_integrity(&what, || self.fetch_pair(&platform, &release)).await;
                ((platform.id, release.id), result)
            })
            .buffer_unordered(self.concurrency())
            .collect()
            .await;

        for (key, result) in results {
            let (features, report) = result?;
            arena.report.merge(report);
            arena.features.insert(key, features);
        }
        Ok(())
    }

    async fn fetch_pair(
        &self,
        platform: &Platform,
        release: &Release,
    ) -> Result<(BTreeMap<String, Feature>, CrawlReport)> {
        let branch = format!("platform:{}/release:{}", platform.id, release.id);
        let (items, report) = self
            .paginate(&branch, SourceKind::FeatureList, |page| {
                self.feature_request(platform, release, page)
            })
            .await;

        let mut features: BTreeMap<String, Feature> = BTreeMap::new();
        for item in items {
            let Item::Feature(entry) = item else {
                continue;
            };
            let hash_id = Feature::hash_id(&platform.id, &release.id, &entry.name, self.digest_bytes);
            let feature = Feature {
                hash_id: hash_id.clone(),
                platform_id: platform.id.clone(),
                release_id: release.id.clone(),
                name: entry.name,
                description: entry.description,
                feature_sets: entry.feature_set.into_iter().collect(),
            };
            match features.entry(hash_id) {
                Entry::Occupied(mut slot) => {
                    if let Err(err) = slot.get_mut().absorb(feature) {
                        log::error!("Integrity fault in {}: {}", branch, err);
                        return Err(err);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(feature);
                }
            }
        }
        Ok((features, report))
    }

    /// Fetch pages `1..` of one listing until an empty page.
    ///
    /// Never fails: fetch errors and repeated extraction failures end the
    /// listing and mark its branch incomplete, keeping what was collected.
    /// Skipped pages also leave the branch incomplete.
    async fn paginate<F>(&self, branch: &str, kind: SourceKind, request_for: F) -> (Vec<Item>, CrawlReport)
    where
        F: Fn(u32) -> FetchRequest,
    {
        let mut report = CrawlReport::new(DatasetType::Features);
        let mut items = Vec::new();
        let mut problems = Vec::new();
        let mut skipped = Vec::new();
        let mut extraction_failures = 0;
        let mut hit_cap = true;

        for page in 1..=MAX_CATALOG_PAGES {
            let request = request_for(page);
            let body = match self.fetcher.fetch(&request).await {
                Ok(body) => body,
                Err(err) => {
                    report.errors.record_fetch(&err);
                    problems.push(format!("page {page}: {err}"));
                    hit_cap = false;
                    break;
                }
            };
            report.pages_fetched += 1;

            match self.extractor.extract(&body, kind, &request.page_url()) {
                Ok(extracted) if extracted.is_empty() => {
                    hit_cap = false;
                    break;
                }
                Ok(extracted) => {
                    extraction_failures = 0;
                    items.extend(extracted.items);
                }
                Err(err) => {
                    report.errors.extraction += 1;
                    extraction_failures += 1;
                    skipped.push(page);
                    log::warn!("Skipping {} page {} ({}): {}", kind, page, request, err);
                    if extraction_failures >= MAX_CONSECUTIVE_EXTRACTION_FAILURES {
                        problems.push(format!(
                            "{extraction_failures} consecutive pages failed extraction"
                        ));
                        hit_cap = false;
                        break;
                    }
                }
            }
        }

        if hit_cap {
            problems.push(format!("stopped after {MAX_CATALOG_PAGES} pages"));
        }
        if !skipped.is_empty() {
            let pages: Vec<String> = skipped.iter().map(u32::to_string).collect();
            problems.push(format!("skipped unextractable page(s) {}", pages.join(", ")));
        }
        report.end_branch(branch, problems);
        (items, report)
    }

    fn catalog_body(
        &self,
        platform_type: PlatformType,
        platform_id: Option<&str>,
        release_id: Option<&str>,
        page: u32,
    ) -> Value {
        let mut body = Map::new();
        body.insert("mdf_product_type".into(), Value::from(platform_type.as_str()));
        if let Some(id) = platform_id {
            body.insert("platform_id".into(), id_value(id));
        }
        if let Some(id) = release_id {
            body.insert("release_id".into(), id_value(id));
        }
        body.insert("page".into(), Value::from(page));
        body.insert("limit".into(), Value::from(self.job.page_size));
        Value::Object(body)
    }

    pub(crate) fn platform_request(&self, platform_type: PlatformType, page: u32) -> FetchRequest {
        FetchRequest::post_json(
            &self.job.platforms_url,
            self.catalog_body(platform_type, None, None, page),
        )
    }

    pub(crate) fn release_request(&self, platform: &Platform, page: u32) -> FetchRequest {
        FetchRequest::post_json(
            &self.job.releases_url,
            self.catalog_body(platform.platform_type, Some(&platform.id), None, page),
        )
    }

    pub(crate) fn feature_request(&self, platform: &Platform, release: &Release, page: u32) -> FetchRequest {
        FetchRequest::post_json(
            &self.job.features_url,
            self.catalog_body(
                platform.platform_type,
                Some(&platform.id),
                Some(&release.id),
                page,
            ),
        )
    }
}

/// Upstream ids are integers; keep anything else as a string.
fn id_value(id: &str) -> Value {
    id.parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(id))
}
