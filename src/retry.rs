// src/retry.rs

use crate::error::AnalyzerError;
use std::time::Duration;
use tracing::{error, info, warn};

pub const DEFAULT_MAX_RETRIES: usize = 3;

type Sleeper = Box<dyn Fn(Duration) + Send + Sync>;

/// Runs flaky operations with bounded retries, honoring each failure's own
/// retry policy. Back-off blocks the calling thread.
pub struct RetryExecutor {
    max_retries: usize,
    sleeper: Sleeper,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl RetryExecutor {
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// Replace the back-off sleep, e.g. to record delays instead of waiting
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Run `operation` until it succeeds, fails terminally, or runs out of
    /// attempts. The last failure is returned as-is.
    pub fn run<T, E, F>(&self, label: &str, mut operation: F) -> Result<T, AnalyzerError>
    where
        F: FnMut() -> Result<T, E>,
        E: Into<AnalyzerError>,
    {
        let attempts = self.max_attempts();
        let mut attempt = 0;
        loop {
            let err: AnalyzerError = match operation() {
                Ok(value) => {
                    if attempt > 0 {
                        info!("Operation '{}' succeeded after {} retries", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => e.into(),
            };

            attempt += 1;
            if !err.is_retryable() || attempt >= attempts {
                error!("Operation '{}' failed after {} attempt(s): {}", label, attempt, err);
                return Err(err);
            }

            let delay = err.retry_delay();
            warn!(
                "Operation '{}' failed (attempt {}/{}): {}. Retrying in {:?}...",
                label, attempt, attempts, err, delay
            );
            (self.sleeper)(delay);
        }
    }
}
