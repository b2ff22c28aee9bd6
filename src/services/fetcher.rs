// src/services/fetcher.rs

//! Paced, bounded-concurrency upstream retrieval.
//!
//! Every crawl job shares one [`RateLimitedFetcher`]. It holds a global
//! semaphore (the concurrency cap) and a global dispatch clock (the pacing
//! delay), so the aggregate pressure on the upstream source stays bounded no
//! matter how many crawls run at once. A request keeps its permit from the
//! first attempt until its final result, retries included.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use url::Url;

use crate::error::{FetchError, Result};
use crate::models::FetcherConfig;
use crate::utils::http::create_async_client;

/// HTTP method of an upstream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One upstream request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// The URL with its query string, as the page it fetches is addressed.
    pub fn page_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        Url::parse_with_params(&self.url, &self.query)
            .map(String::from)
            .unwrap_or_else(|_| self.url.clone())
    }

    /// Stable single-line description, used in logs and by test transports.
    pub fn describe(&self) -> String {
        let mut out = match self.method {
            Method::Get => format!("GET {}", self.url),
            Method::Post => format!("POST {}", self.url),
        };
        if !self.query.is_empty() {
            let query = self
                .query
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            out.push('?');
            out.push_str(&query);
        }
        if let Some(body) = &self.body {
            out.push(' ');
            out.push_str(&body.to_string());
        }
        out
    }
}

impl fmt::Display for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Executes a single attempt of a request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &FetchRequest) -> std::result::Result<String, FetchError>;
}

/// [`Transport`] backed by a `reqwest` client.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &FetchRequest) -> std::result::Result<String, FetchError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

/// Counters readable while crawls run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetcherStats {
    /// Attempts sent to the transport, retries included
    pub dispatched: u64,
    pub retries: u64,
    pub rate_limited: u64,
    /// Requests that surfaced an error to the caller
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    retries: AtomicU64,
    rate_limited: AtomicU64,
    failures: AtomicU64,
}

/// Shared, paced and bounded request executor.
pub struct RateLimitedFetcher {
    transport: Arc<dyn Transport>,
    config: FetcherConfig,
    permits: Arc<Semaphore>,
    last_dispatch: Mutex<Option<Instant>>,
    counters: Counters,
}

impl RateLimitedFetcher {
    pub fn new(transport: Arc<dyn Transport>, config: FetcherConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            transport,
            config,
            permits,
            last_dispatch: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    /// Build a fetcher over the real HTTP transport.
    pub fn http(config: FetcherConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    pub fn stats(&self) -> FetcherStats {
        FetcherStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            rate_limited: self.counters.rate_limited.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Fetch a payload, retrying transient failures within the attempt budget.
    pub async fn fetch(&self, request: &FetchRequest) -> std::result::Result<String, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::Network("fetcher is shut down".to_string()))?;

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            self.pace().await;
            self.counters.dispatched.fetch_add(1, Ordering::Relaxed);

            let result =
                match tokio::time::timeout(self.config.timeout(), self.transport.execute(request))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout),
                };

            let error = match result {
                Ok(body) => {
                    if attempt > 1 {
                        log::debug!("{} succeeded on attempt {}", request, attempt);
                    }
                    return Ok(body);
                }
                Err(error) => error,
            };

            if !error.is_retryable() || attempt >= max_attempts {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "{} failed after {} attempt(s): {}",
                    request,
                    attempt,
                    error
                );
                return Err(error);
            }

            let delay = if error == FetchError::RateLimited {
                self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
                let delay = self.config.rate_limit_delay(attempt);
                log::warn!(
                    "{} rate limited (attempt {}/{}), backing off {:?}",
                    request,
                    attempt,
                    max_attempts,
                    delay
                );
                delay
            } else {
                let delay = self.config.retry_delay(attempt);
                log::warn!(
                    "{} failed (attempt {}/{}): {}, retrying in {:?}",
                    request,
                    attempt,
                    max_attempts,
                    error,
                    delay
                );
                delay
            };

            self.counters.retries.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Wait until the global pacing gap since the previous dispatch has elapsed.
    async fn pace(&self) {
        let mut last = self.last_dispatch.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.config.request_delay();
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
