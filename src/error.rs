// src/error.rs

//! Unified error handling for the lifecycle crawler.
//!
//! `AppError` is what crosses module boundaries. The narrower `FetchError`
//! and `ExtractionError` kinds are produced by the fetcher and extractor and
//! drive the retry and skip policies of the crawlers.

use std::fmt;

use thiserror::Error;

use crate::models::{DatasetType, SourceKind};

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Failure of a single upstream request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request did not complete within the per-fetch timeout
    #[error("request timed out")]
    Timeout,

    /// Upstream answered with a non-success status (other than 429)
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// Connection, DNS or body transfer failure
    #[error("network error: {0}")]
    Network(String),

    /// Upstream answered 429 Too Many Requests
    #[error("rate limited by upstream")]
    RateLimited,
}

impl FetchError {
    /// Whether the fetcher should try the request again.
    ///
    /// Client-side rejections (4xx other than 429) surface immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Network(_) | FetchError::RateLimited => true,
            FetchError::HttpStatus(code) => (500..600).contains(code),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            if status.as_u16() == 429 {
                FetchError::RateLimited
            } else {
                FetchError::HttpStatus(status.as_u16())
            }
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Failure to map a payload onto any known layout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// No variant matcher for the source kind found its structural anchors
    #[error("no known layout matched {kind} payload")]
    NoStructuralMatch { kind: SourceKind },

    /// A built-in selector failed to parse
    #[error("invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Upstream fetch failed after the retry budget
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Payload did not match any known layout
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Two records share a key but differ in content
    #[error("Integrity error for {key}: {message}")]
    Integrity { key: String, message: String },

    /// Record set rejected at commit time
    #[error("Commit validation failed: {0}")]
    CommitValidation(String),

    /// A committed snapshot failed its checksum
    #[error("Snapshot {dataset} v{version} failed checksum validation")]
    SnapshotCorrupt { dataset: DatasetType, version: u64 },

    /// Crawling error
    #[error("Crawl error for {context}: {message}")]
    Crawl { context: String, message: String },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an integrity error for a record key.
    pub fn integrity(key: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Integrity {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Create a commit validation error.
    pub fn commit_validation(message: impl Into<String>) -> Self {
        Self::CommitValidation(message.into())
    }

    /// Create a crawl error with context.
    pub fn crawl(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Crawl {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Whether this is an integrity fault (drives the retry-once policy).
    pub fn is_integrity(&self) -> bool {
        matches!(self, AppError::Integrity { .. })
    }
}
