//! Pipeline entry points.
//!
//! - `run_refresh`: crawl one dataset and commit it as a snapshot
//! - `RefreshScheduler`: keep every dataset fresh on its interval
//! - `list`: paginated reads over the latest snapshots
//! - `CircuitBreaker` / `validate_records`: the commit gate

pub mod circuit_breaker;
pub mod query;
pub mod refresh;
pub mod scheduler;
pub mod validate;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerResult};
pub use query::{DatasetQuery, Page, Pagination, list};
pub use refresh::{
    FeatureRefreshJob, FlatRefreshJob, RefreshJob, build_job, build_jobs, commit_outcome,
    run_refresh,
};
pub use scheduler::{RefreshScheduler, SingleFlight, Trigger};
pub use validate::validate_records;
