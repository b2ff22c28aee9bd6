// src/services/flat.rs

//! Paginated crawl of a single-level dataset.
//!
//! Pages of one query are fetched strictly in order; independent queries
//! run concurrently under the shared fetcher's cap. Every record goes
//! through the run's [`Staging`] buffer, so overlapping pages coalesce and
//! conflicting ones raise an integrity fault that restarts the batch once.
//!
//! Listing pages that only link to their entries (EOL notice listings,
//! field notice lists) are followed one level deep: each linked detail
//! page is fetched through the same fetcher and staged like a listing page.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::FutureExt;
use futures::stream::{self, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{
    CrawlOutcome, CrawlReport, DatasetType, FlatJobConfig, Record, SoftwareScope, SourceKind,
};
use crate::services::extract::{Item, PageExtractor};
use crate::services::fetcher::{FetchRequest, RateLimitedFetcher};
use crate::services::staging::Staging;

/// Query filters, ordered so requests and branch names are stable.
pub type FilterParams = BTreeMap<String, String>;

/// Consecutive unextractable pages after which a query gives up.
const MAX_CONSECUTIVE_EXTRACTION_FAILURES: u32 = 3;

/// One paginated upstream listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatSource {
    pub dataset: DatasetType,
    pub kind: SourceKind,
    pub url: String,
    pub page_param: String,
    pub max_pages: u32,
    pub follow_details: bool,
    pub max_details: usize,
}

impl FlatSource {
    /// Build the source for a flat dataset from its job settings.
    pub fn from_job(dataset: DatasetType, job: &FlatJobConfig) -> Result<Self> {
        let kind = match dataset {
            DatasetType::Eol => SourceKind::EolPage,
            DatasetType::FieldNotices => SourceKind::FieldNoticePage,
            DatasetType::Products => SourceKind::ProductListing,
            DatasetType::Features => {
                return Err(AppError::config(
                    "features is a hierarchical dataset, not a flat source",
                ));
            }
        };
        Ok(Self {
            dataset,
            kind,
            url: job.url.clone(),
            page_param: job.page_param.clone(),
            max_pages: job.max_pages,
            follow_details: job.follow_details,
            max_details: job.max_details,
        })
    }

    /// `GET url?<filters>&<page_param>=<page>`
    pub fn page_request(&self, filters: &FilterParams, page: u32) -> FetchRequest {
        let request = filters
            .iter()
            .fold(FetchRequest::get(&self.url), |req, (k, v)| {
                req.with_query(k.as_str(), v.as_str())
            });
        request.with_query(self.page_param.as_str(), page.to_string())
    }
}

/// Report branch name of a query.
pub fn branch_name(filters: &FilterParams) -> String {
    if filters.is_empty() {
        return "query:all".to_string();
    }
    let parts: Vec<String> = filters.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("query:{}", parts.join(","))
}

/// Crawler for EOL, field notice and product listing sources.
pub struct FlatCrawler {
    fetcher: Arc<RateLimitedFetcher>,
    extractor: PageExtractor,
}

impl FlatCrawler {
    pub fn new(fetcher: Arc<RateLimitedFetcher>) -> Self {
        Self {
            fetcher,
            extractor: PageExtractor::new(),
        }
    }

    /// Crawl one query to completion.
    pub async fn crawl(&self, source: &FlatSource, filters: &FilterParams) -> Result<CrawlOutcome> {
        self.crawl_all(source, std::slice::from_ref(filters)).await
    }

    /// Crawl every query as one batch.
    ///
    /// An integrity fault discards the batch and runs it once more from an
    /// empty buffer; a second fault fails the crawl.
    pub async fn crawl_all(
        &self,
        source: &FlatSource,
        queries: &[FilterParams],
    ) -> Result<CrawlOutcome> {
        match self.crawl_batch(source, queries).await {
            Err(err) if err.is_integrity() => {
                log::warn!(
                    "{} crawl hit an integrity fault ({}); retrying the batch once",
                    source.dataset,
                    err
                );
                let mut outcome = self.crawl_batch(source, queries).await?;
                outcome.report.errors.integrity += 1;
                Ok(outcome)
            }
            other => other,
        }
    }

    async fn crawl_batch(
        &self,
        source: &FlatSource,
        queries: &[FilterParams],
    ) -> Result<CrawlOutcome> {
        let default_query = [FilterParams::new()];
        let queries = if queries.is_empty() {
            &default_query[..]
        } else {
            queries
        };
        let concurrency = self.fetcher.config().max_concurrent.max(1);

        let mut results: Vec<(usize, Result<(Staging, CrawlReport)>)> = stream::iter(
            queries.iter().enumerate(),
        )
        .map(|(idx, filters)| async move { (idx, self.crawl_query(source, filters).await) }.boxed())
        .boxed()
        .buffer_unordered(concurrency)
        .collect()
        .await;
        results.sort_by_key(|(idx, _)| *idx);

        let mut staging = Staging::new();
        let mut report = CrawlReport::new(source.dataset);
        for (_, result) in results {
            let (query_staging, query_report) = result?;
            staging.merge(query_staging)?;
            report.merge(query_report);
        }
        report.finish();

        log::info!(
            "{} crawl finished: {} records, {} pages, {} incomplete branch(es)",
            source.dataset,
            staging.len(),
            report.pages_fetched,
            report.incomplete_branches().count()
        );
        Ok(CrawlOutcome {
            records: staging.into_records(),
            report,
        })
    }

    /// Page through one query until the source runs out of pages, then
    /// visit the detail pages it linked to.
    async fn crawl_query(
        &self,
        source: &FlatSource,
        filters: &FilterParams,
    ) -> Result<(Staging, CrawlReport)> {
        let branch = branch_name(filters);
        let scope = SoftwareScope::from_filters(filters);
        let mut staging = Staging::new();
        let mut report = CrawlReport::new(source.dataset);
        let mut problems = Vec::new();
        let mut skipped = Vec::new();
        let mut seen = BTreeSet::new();
        let mut details = Vec::new();
        let mut extraction_failures = 0;
        let mut page = 1;

        loop {
            if page > source.max_pages {
                problems.push(format!("stopped after max_pages={}", source.max_pages));
                break;
            }

            let request = source.page_request(filters, page);
            let body = match self.fetcher.fetch(&request).await {
                Ok(body) => body,
                Err(err) => {
                    report.errors.record_fetch(&err);
                    problems.push(format!("page {page}: {err}"));
                    break;
                }
            };
            report.pages_fetched += 1;

            let extracted = match self.extractor.extract(&body, source.kind, &request.page_url()) {
                Ok(extracted) => extracted,
                Err(err) => {
                    report.errors.extraction += 1;
                    extraction_failures += 1;
                    skipped.push(page);
                    log::warn!("Skipping {} page {} ({}): {}", source.kind, page, request, err);
                    if extraction_failures >= MAX_CONSECUTIVE_EXTRACTION_FAILURES {
                        problems.push(format!(
                            "{extraction_failures} consecutive pages failed extraction"
                        ));
                        break;
                    }
                    page += 1;
                    continue;
                }
            };
            extraction_failures = 0;

            if extracted.is_empty() {
                break;
            }
            let has_next = extracted.has_next;
            if source.follow_details {
                details.extend(extracted.details.into_iter().filter(|url| seen.insert(url.clone())));
            }
            stage_items(&mut staging, extracted.items, scope.as_ref())?;

            if has_next == Some(false) {
                break;
            }
            page += 1;
        }

        if details.len() > source.max_details {
            problems.push(format!(
                "{} detail pages linked, followed max_details={}",
                details.len(),
                source.max_details
            ));
            details.truncate(source.max_details);
        }
        self.follow_details(source, &details, scope.as_ref(), &mut staging, &mut report, &mut problems)
            .await?;

        if !skipped.is_empty() {
            let pages: Vec<String> = skipped.iter().map(u32::to_string).collect();
            problems.push(format!("skipped unextractable page(s) {}", pages.join(", ")));
        }
        report.end_branch(&branch, problems);

        log::debug!(
            "{} {}: {} records after {} page(s), {} detail page(s)",
            source.dataset,
            branch,
            staging.len(),
            page,
            details.len()
        );
        Ok((staging, report))
    }

    /// Fetch linked detail pages concurrently and stage them in link order.
    async fn follow_details<'u>(
        &self,
        source: &FlatSource,
        urls: &'u [String],
        scope: Option<&SoftwareScope>,
        staging: &mut Staging,
        report: &mut CrawlReport,
        problems: &mut Vec<String>,
    ) -> Result<()> {
        let concurrency = self.fetcher.config().max_concurrent.max(1);
        let mut pages: Vec<_> = stream::iter(urls.iter().enumerate())
            .map(|(idx, url): (usize, &'u String)| async move {
                let request = FetchRequest::get(url.as_str());
                (idx, url, self.fetcher.fetch(&request).await)
            }
            .boxed())
            .boxed()
            .buffer_unordered(concurrency)
            .collect()
            .await;
        pages.sort_by_key(|(idx, _, _)| *idx);

        for (_, url, body) in pages {
            let body = match body {
                Ok(body) => body,
                Err(err) => {
                    report.errors.record_fetch(&err);
                    problems.push(format!("detail {url}: {err}"));
                    continue;
                }
            };
            report.pages_fetched += 1;

            match self.extractor.extract(&body, source.kind, url) {
                Ok(extracted) => {
                    if !extracted.details.is_empty() {
                        log::debug!(
                            "Not following {} link(s) found on detail page {}",
                            extracted.details.len(),
                            url
                        );
                    }
                    stage_items(staging, extracted.items, scope)?;
                }
                Err(err) => {
                    report.errors.extraction += 1;
                    log::warn!("Skipping {} detail page {}: {}", source.kind, url, err);
                    problems.push(format!("detail {url}: {err}"));
                }
            }
        }
        Ok(())
    }
}

/// Stage the self-contained records among `items`.
fn stage_items(staging: &mut Staging, items: Vec<Item>, scope: Option<&SoftwareScope>) -> Result<()> {
    for item in items {
        let Some(mut record) = item.into_record() else {
            continue;
        };
        if let Some(scope) = scope {
            stamp_scope(&mut record, scope);
        }
        staging.insert(record)?;
    }
    Ok(())
}

/// Attach the query's software scope to records that carry one.
fn stamp_scope(record: &mut Record, scope: &SoftwareScope) {
    match record {
        Record::Eol(e) => e.software = Some(scope.clone()),
        Record::FieldNotice(n) => n.software = Some(scope.clone()),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::models::FetcherConfig;
    use crate::services::testing::MockTransport;

    const EOL_URL: &str = "https://www.example.com/eol/search";

    fn source(max_pages: u32) -> FlatSource {
        FlatSource {
            dataset: DatasetType::Eol,
            kind: SourceKind::EolPage,
            url: EOL_URL.to_string(),
            page_param: "page".to_string(),
            max_pages,
            follow_details: true,
            max_details: 50,
        }
    }

    const FN_URL: &str = "https://www.example.com/support/catalyst-9300/products-field-notices-list.html";

    fn fn_source() -> FlatSource {
        FlatSource {
            dataset: DatasetType::FieldNotices,
            kind: SourceKind::FieldNoticePage,
            url: FN_URL.to_string(),
            ..source(10)
        }
    }

    /// Field notice detail page affecting `products`.
    fn fn_detail(id: &str, products: &[&str]) -> String {
        let rows: String = products
            .iter()
            .map(|p| format!("<tr><td>{p}</td></tr>"))
            .collect();
        format!(
            r#"<h1 id="fw-pagetitle">FN - {id} - Fan Failure - Workaround Provided</h1>
               <h3>Background</h3><p>Fans in early units can stall.</p>
               <h3>Products Affected</h3>
               <table><tr><th>Affected Product ID</th></tr>{rows}</table>"#
        )
    }

    fn crawler(transport: Arc<MockTransport>) -> FlatCrawler {
        let config = FetcherConfig {
            request_delay_ms: 0,
            max_attempts: 2,
            backoff_base_ms: 10,
            backoff_max_ms: 10,
            ..FetcherConfig::default()
        };
        FlatCrawler::new(Arc::new(RateLimitedFetcher::new(transport, config)))
    }

    fn ios_15_1() -> FilterParams {
        FilterParams::from([
            ("software_type".to_string(), "IOS".to_string()),
            ("software_version".to_string(), "15.1".to_string()),
        ])
    }

    /// EOL card page; `cards` are (product, end-of-sale date).
    fn eol_page(cards: &[(&str, &str)], next: bool) -> String {
        let mut html = String::from("<html><body>");
        for (product, date) in cards {
            html.push_str(&format!(
                r#"<div class="eol-record" data-product-id="{product}"><dt>End-of-Sale Date</dt><dd>{date}</dd></div>"#
            ));
        }
        if next {
            html.push_str(r#"<a rel="next" href="?page=next">Next</a>"#);
        }
        html.push_str("</body></html>");
        html
    }

    fn keys(outcome: &CrawlOutcome) -> Vec<String> {
        outcome.records.iter().map(Record::natural_key).collect()
    }

    #[test]
    fn test_page_request_shape() {
        let request = source(10).page_request(&ios_15_1(), 3);
        assert_eq!(
            request.describe(),
            "GET https://www.example.com/eol/search?software_type=IOS&software_version=15.1&page=3"
        );
        assert_eq!(branch_name(&ios_15_1()), "query:software_type=IOS,software_version=15.1");
        assert_eq!(branch_name(&FilterParams::new()), "query:all");
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_pages_do_not_duplicate() {
        let transport = Arc::new(MockTransport::new());
        let src = source(10);
        let filters = ios_15_1();
        transport.push(
            &src.page_request(&filters, 1),
            Ok(eol_page(&[("C2960-24", "May 1, 2015"), ("C2960-48", "May 1, 2015")], true)),
        );
        transport.push(
            &src.page_request(&filters, 2),
            Ok(eol_page(&[("C2960-48", "May 1, 2015"), ("C3560-24", "June 2, 2016")], false)),
        );

        let outcome = crawler(transport).crawl(&src, &filters).await.unwrap();

        assert_eq!(
            keys(&outcome),
            vec![
                "eol:IOS/15.1:C2960-24",
                "eol:IOS/15.1:C2960-48",
                "eol:IOS/15.1:C3560-24",
            ]
        );
        assert!(outcome.report.is_complete());
        assert_eq!(outcome.report.pages_fetched, 2);
        match &outcome.records[2] {
            Record::Eol(e) => assert_eq!(e.milestones["end_of_sale"], "2016-06-02"),
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_page_terminates() {
        let transport = Arc::new(MockTransport::new());
        let src = source(10);
        let filters = FilterParams::new();
        transport.push(&src.page_request(&filters, 1), Ok(eol_page(&[("A", "2020-01-01")], true)));
        transport.push(
            &src.page_request(&filters, 2),
            Ok(r#"<table class="eol-listing"><tr><th>Product ID</th></tr></table>"#.into()),
        );

        let outcome = crawler(transport.clone()).crawl(&src, &filters).await.unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert!(outcome.report.is_complete());
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_marks_branch_incomplete() {
        let transport = Arc::new(MockTransport::new());
        let src = source(10);
        let filters = FilterParams::new();
        transport.push(&src.page_request(&filters, 1), Ok(eol_page(&[("A", "2020-01-01")], true)));
        transport.push(&src.page_request(&filters, 2), Err(FetchError::HttpStatus(403)));

        let outcome = crawler(transport).crawl(&src, &filters).await.unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert!(!outcome.report.is_complete());
        assert_eq!(outcome.report.errors.http_status, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unextractable_page_is_skipped_and_reported() {
        let transport = Arc::new(MockTransport::new());
        let src = source(10);
        let filters = FilterParams::new();
        transport.push(&src.page_request(&filters, 1), Ok(eol_page(&[("A", "2020-01-01")], true)));
        transport.push(&src.page_request(&filters, 2), Ok("<p>temporarily unavailable</p>".into()));
        transport.push(&src.page_request(&filters, 3), Ok(eol_page(&[("B", "2020-01-01")], false)));

        let outcome = crawler(transport).crawl(&src, &filters).await.unwrap();

        assert_eq!(keys(&outcome), vec!["eol:A", "eol:B"]);
        assert_eq!(outcome.report.errors.extraction, 1);
        assert!(!outcome.report.is_complete());
        assert_eq!(
            outcome.report.branches[0].detail.as_deref(),
            Some("skipped unextractable page(s) 2")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_extraction_failures_stop_query() {
        let transport = Arc::new(MockTransport::new().with_fallback("<p>layout changed</p>"));
        let src = source(50);
        let filters = FilterParams::new();

        let outcome = crawler(transport.clone()).crawl(&src, &filters).await.unwrap();

        assert!(outcome.records.is_empty());
        assert!(!outcome.report.is_complete());
        assert_eq!(transport.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_pages_marks_incomplete() {
        let transport = Arc::new(MockTransport::new());
        let src = source(2);
        let filters = FilterParams::new();
        transport.push(&src.page_request(&filters, 1), Ok(eol_page(&[("A", "x")], true)));
        transport.push(&src.page_request(&filters, 2), Ok(eol_page(&[("B", "x")], true)));

        let outcome = crawler(transport).crawl(&src, &filters).await.unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert!(!outcome.report.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_conflict_recovers_on_batch_retry() {
        let transport = Arc::new(MockTransport::new());
        let src = source(10);
        let filters = FilterParams::new();
        transport.push(&src.page_request(&filters, 1), Ok(eol_page(&[("A", "2020-01-01")], true)));
        // first pass disagrees with page 1, the re-crawl agrees
        transport.push(&src.page_request(&filters, 2), Ok(eol_page(&[("A", "2020-09-09")], false)));
        transport.push(&src.page_request(&filters, 2), Ok(eol_page(&[("A", "2020-01-01")], false)));

        let outcome = crawler(transport.clone()).crawl(&src, &filters).await.unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.report.errors.integrity, 1);
        assert_eq!(transport.calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_conflict_fails_crawl() {
        let transport = Arc::new(MockTransport::new());
        let src = source(10);
        let filters = FilterParams::new();
        transport.push(&src.page_request(&filters, 1), Ok(eol_page(&[("A", "2020-01-01")], true)));
        transport.push(&src.page_request(&filters, 2), Ok(eol_page(&[("A", "2020-09-09")], false)));

        let err = crawler(transport.clone()).crawl(&src, &filters).await.unwrap_err();

        assert!(err.is_integrity());
        assert_eq!(transport.calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queries_are_separate_branches() {
        let transport = Arc::new(MockTransport::new());
        let src = source(10);
        let ios = ios_15_1();
        let xe = FilterParams::from([
            ("software_type".to_string(), "IOS XE".to_string()),
            ("software_version".to_string(), "17.3".to_string()),
        ]);
        transport.push(&src.page_request(&ios, 1), Ok(eol_page(&[("A", "x")], false)));
        transport.push(&src.page_request(&xe, 1), Err(FetchError::HttpStatus(500)));

        let outcome = crawler(transport)
            .crawl_all(&src, &[ios, xe])
            .await
            .unwrap();

        assert_eq!(keys(&outcome), vec!["eol:IOS/15.1:A"]);
        assert_eq!(outcome.report.branches.len(), 2);
        assert_eq!(outcome.report.incomplete_branches().count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notice_list_follows_detail_pages() {
        let transport = Arc::new(MockTransport::new());
        let src = fn_source();
        let filters = FilterParams::new();
        transport.push(
            &src.page_request(&filters, 1),
            Ok(r#"<ul class="fn-list">
                    <li><a href="/docs/field-notices/704/fn70489.html">FN70489</a></li>
                    <li><a href="/docs/field-notices/703/fn70360.html">FN70360</a></li>
                  </ul>"#
                .into()),
        );
        let first = "https://www.example.com/docs/field-notices/704/fn70489.html";
        let second = "https://www.example.com/docs/field-notices/703/fn70360.html";
        transport.push(&FetchRequest::get(first), Ok(fn_detail("70489", &["C9300-48P", "C9300-24T"])));
        transport.push(&FetchRequest::get(second), Ok(fn_detail("70360", &[])));

        let outcome = crawler(transport.clone()).crawl(&src, &filters).await.unwrap();

        assert_eq!(
            keys(&outcome),
            vec!["fn:70360", "fn:70489:C9300-24T", "fn:70489:C9300-48P"]
        );
        let Record::FieldNotice(notice) = &outcome.records[1] else {
            panic!("expected a field notice");
        };
        assert_eq!(notice.url.as_deref(), Some(first));
        assert_eq!(notice.background.as_deref(), Some("Fans in early units can stall."));
        assert_eq!(notice.description_short.as_deref(), Some("Fan Failure"));
        assert!(outcome.report.is_complete());
        assert_eq!(outcome.report.pages_fetched, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detail_links_fetched_once_across_pages() {
        let transport = Arc::new(MockTransport::new());
        let src = fn_source();
        let filters = FilterParams::new();
        let list = r#"<ul class="fn-list"><li><a href="/docs/field-notices/704/fn70489.html">FN70489</a></li></ul>"#;
        transport.push(
            &src.page_request(&filters, 1),
            Ok(format!(r#"{list}<a rel="next" href="?page=2">Next</a>"#)),
        );
        transport.push(&src.page_request(&filters, 2), Ok(list.into()));
        let detail = FetchRequest::get("https://www.example.com/docs/field-notices/704/fn70489.html");
        transport.push(&detail, Ok(fn_detail("70489", &["C9300-48P"])));

        let outcome = crawler(transport.clone()).crawl(&src, &filters).await.unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(transport.calls_for(&detail), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_detail_page_marks_branch_incomplete() {
        let transport = Arc::new(MockTransport::new());
        let src = fn_source();
        let filters = FilterParams::new();
        transport.push(
            &src.page_request(&filters, 1),
            Ok(r#"<ul class="fn-list">
                    <li><a href="/docs/field-notices/704/fn70489.html">FN70489</a></li>
                    <li><a href="/docs/field-notices/703/fn70360.html">FN70360</a></li>
                  </ul>"#
                .into()),
        );
        transport.push(
            &FetchRequest::get("https://www.example.com/docs/field-notices/704/fn70489.html"),
            Ok(fn_detail("70489", &["C9300-48P"])),
        );

        let outcome = crawler(transport).crawl(&src, &filters).await.unwrap();

        assert_eq!(keys(&outcome), vec!["fn:70489:C9300-48P"]);
        assert!(!outcome.report.is_complete());
        let detail = outcome.report.branches[0].detail.clone().unwrap_or_default();
        assert!(detail.contains("fn70360.html"));
        assert_eq!(outcome.report.errors.http_status, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detail_following_can_be_disabled() {
        let transport = Arc::new(MockTransport::new());
        let src = FlatSource {
            follow_details: false,
            ..fn_source()
        };
        let filters = FilterParams::new();
        transport.push(
            &src.page_request(&filters, 1),
            Ok(r#"<ul class="fn-list"><li><a href="fn70489.html">FN70489</a></li></ul>"#.into()),
        );

        let outcome = crawler(transport.clone()).crawl(&src, &filters).await.unwrap();

        assert!(outcome.records.is_empty());
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detail_layout_stamps_fetched_page_url() {
        let transport = Arc::new(MockTransport::new());
        let src = fn_source();
        let filters = ios_15_1();
        transport.push(&src.page_request(&filters, 1), Ok(fn_detail("70417", &[])));

        let outcome = crawler(transport).crawl(&src, &filters).await.unwrap();

        let Record::FieldNotice(notice) = &outcome.records[0] else {
            panic!("expected a field notice");
        };
        assert_eq!(
            notice.url.as_deref(),
            Some(format!("{FN_URL}?software_type=IOS&software_version=15.1&page=1").as_str())
        );
    }
}
