//! Retry with linear backoff for external catalog calls

use std::time::Duration;

use crate::error::FetchError;

/// Retry discipline wrapping a single external call.
///
/// Only transient errors are retried; anything else propagates on first
/// occurrence. Backoff grows linearly with the attempt number.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Linear backoff: base_delay * attempt
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Run `attempt_fn`, retrying transient failures up to `max_retries` times.
    ///
    /// Returns `Ok(T)` on first success, or the final `Err` on exhaustion /
    /// terminal error.
    pub fn call<T>(
        &self,
        label: &str,
        mut attempt_fn: impl FnMut() -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        let mut attempt = 0u32;
        loop {
            match attempt_fn() {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_retries && e.is_transient() => {
                    attempt += 1;
                    let delay = self.backoff_duration(attempt);
                    log::warn!(
                        "{label}: attempt {attempt}/{} failed: {e}, retrying in {delay:?}",
                        self.max_retries
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => {
                    log::error!("{label}: failed permanently: {e}");
                    return Err(e);
                }
            }
        }
    }
}
