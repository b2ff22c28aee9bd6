//! Circuit Breaker pattern implementation.
//!
//! Guards the commit path: a record set that is below the dataset's minimum
//! size, or that shrank sharply compared to the snapshot it would replace,
//! is rejected and the previous snapshot keeps serving reads.

use crate::error::{AppError, Result};

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Maximum allowed drop percentage (0-100).
    pub max_drop_percent: u8,
    /// Previous snapshots smaller than this skip the drop check.
    pub min_baseline: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_drop_percent: 50,
            min_baseline: 10,
        }
    }
}

/// Circuit breaker for preventing bad dataset commits.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
}

/// Result of circuit breaker check.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerResult {
    /// Safe to commit
    Safe {
        current_count: usize,
        previous_count: usize,
    },
    /// No previous snapshot, or one below the baseline
    ColdStart { current_count: usize },
    /// Fewer records than the dataset requires
    BelowMinimum {
        current_count: usize,
        min_records: usize,
    },
    /// Record count dropped beyond the threshold
    Triggered {
        current_count: usize,
        previous_count: usize,
        drop_percent: f64,
    },
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self { config }
    }

    /// Classify a prospective commit.
    pub fn check(
        &self,
        current_count: usize,
        previous_count: Option<usize>,
        min_records: usize,
    ) -> CircuitBreakerResult {
        if current_count < min_records {
            return CircuitBreakerResult::BelowMinimum {
                current_count,
                min_records,
            };
        }

        let previous_count = match previous_count {
            Some(count) if count >= self.config.min_baseline => count,
            _ => return CircuitBreakerResult::ColdStart { current_count },
        };

        if current_count < previous_count {
            let drop = previous_count - current_count;
            let drop_percent = (drop as f64 / previous_count as f64) * 100.0;
            if drop_percent > f64::from(self.config.max_drop_percent) {
                return CircuitBreakerResult::Triggered {
                    current_count,
                    previous_count,
                    drop_percent,
                };
            }
        }

        CircuitBreakerResult::Safe {
            current_count,
            previous_count,
        }
    }

    /// Ok when the commit may proceed, `CommitValidation` otherwise.
    pub fn validate(
        &self,
        current_count: usize,
        previous_count: Option<usize>,
        min_records: usize,
    ) -> Result<()> {
        match self.check(current_count, previous_count, min_records) {
            CircuitBreakerResult::Safe {
                current_count,
                previous_count,
            } => {
                log::debug!(
                    "Circuit breaker: SAFE ({} records, was {})",
                    current_count,
                    previous_count
                );
                Ok(())
            }
            CircuitBreakerResult::ColdStart { current_count } => {
                log::debug!("Circuit breaker: COLD START ({} records)", current_count);
                Ok(())
            }
            CircuitBreakerResult::BelowMinimum {
                current_count,
                min_records,
            } => Err(AppError::commit_validation(format!(
                "{current_count} records is below the minimum of {min_records}"
            ))),
            CircuitBreakerResult::Triggered {
                current_count,
                previous_count,
                drop_percent,
            } => {
                log::error!(
                    "Circuit breaker: TRIGGERED! {} → {} records ({:.1}% drop > {}% threshold)",
                    previous_count,
                    current_count,
                    drop_percent,
                    self.config.max_drop_percent
                );
                Err(AppError::commit_validation(format!(
                    "record count dropped {drop_percent:.1}% ({previous_count} → {current_count})"
                )))
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
