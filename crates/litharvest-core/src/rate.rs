//! Per-source politeness delay between external calls

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Minimum delay between calls without an API key (NCBI: 3 req/s)
pub const DELAY_WITHOUT_KEY: Duration = Duration::from_millis(340);

/// Minimum delay between calls with an API key (NCBI: 10 req/s)
pub const DELAY_WITH_KEY: Duration = Duration::from_millis(120);

/// Minimum inter-call delay for one external source.
///
/// A fixed politeness contract with the service, not adaptive. Each worker
/// owns its own budget and paces its own calls.
pub struct RateBudget {
    min_delay: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateBudget {
    /// Budget for a source, keyed or anonymous.
    pub fn new(has_api_key: bool) -> Self {
        let min_delay = if has_api_key {
            DELAY_WITH_KEY
        } else {
            DELAY_WITHOUT_KEY
        };
        Self::with_delay(min_delay)
    }

    pub fn with_delay(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_call: Mutex::new(None),
        }
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Sleep out the remainder of the budget since the previous call,
    /// then mark now as the latest call time.
    pub fn pace(&self) {
        let mut last = self.last_call.lock().expect("rate budget lock poisoned");
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_delay {
                std::thread::sleep(self.min_delay - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_budget_is_smaller() {
        assert!(RateBudget::new(true).min_delay() < RateBudget::new(false).min_delay());
    }

    #[test]
    fn first_call_does_not_sleep() {
        let budget = RateBudget::with_delay(Duration::from_secs(10));
        let start = Instant::now();
        budget.pace();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn second_call_waits_out_the_budget() {
        let budget = RateBudget::with_delay(Duration::from_millis(50));
        budget.pace();
        let start = Instant::now();
        budget.pace();
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn no_sleep_when_budget_already_spent() {
        let budget = RateBudget::with_delay(Duration::from_millis(20));
        budget.pace();
        std::thread::sleep(Duration::from_millis(30));
        let start = Instant::now();
        budget.pace();
        assert!(start.elapsed() < Duration::from_millis(15));
    }
}
