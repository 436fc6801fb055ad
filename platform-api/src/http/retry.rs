//! Retry policy for transient REST failures (connect errors, 5xx, 429).

use std::time::{Duration, SystemTime};

use reqwest_retry::{RetryDecision, RetryPolicy};

const FIRST_DELAY: Duration = Duration::from_millis(500);
const DELAY_CAP: Duration = Duration::from_secs(10);

/// Doubles the pause after every failed attempt, starting at 500ms and
/// never waiting longer than 10s. Gives up after `max_retries` retries or once
/// the request has been in flight for longer than the budget.
pub struct BackoffPolicy {
    max_retries: u32,
    budget: Option<Duration>,
}

impl BackoffPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            budget: None,
        }
    }

    /// Stop retrying once this much time has passed since the first attempt.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    fn pause_before(&self, retry: u32) -> Duration {
        1u32.checked_shl(retry)
            .and_then(|factor| FIRST_DELAY.checked_mul(factor))
            .map_or(DELAY_CAP, |pause| pause.min(DELAY_CAP))
    }

    fn over_budget(&self, started: SystemTime, pause: Duration) -> bool {
        let Some(budget) = self.budget else {
            return false;
        };
        let spent = started.elapsed().unwrap_or_default();
        spent + pause > budget
    }
}

impl RetryPolicy for BackoffPolicy {
    fn should_retry(&self, request_start_time: SystemTime, n_past_retries: u32) -> RetryDecision {
        if n_past_retries >= self.max_retries {
            return RetryDecision::DoNotRetry;
        }

        let pause = self.pause_before(n_past_retries);
        if self.over_budget(request_start_time, pause) {
            return RetryDecision::DoNotRetry;
        }

        RetryDecision::Retry {
            execute_after: SystemTime::now() + pause,
        }
    }
}
