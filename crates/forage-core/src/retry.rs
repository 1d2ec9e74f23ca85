use std::time::Duration;

/// Exponential backoff retry policy.
///
/// A pure decision function: given the current retry count, the task's
/// retry budget, and whether shutdown has been requested, decide whether
/// to retry and how long to wait first. Delays grow as
/// `backoff_base^attempt` seconds, capped at `max_backoff` so repeated
/// failures against a rate-limited target stay spaced out without
/// unbounded waits.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub backoff_base: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    /// 2^attempt seconds, capped at 10 seconds.
    fn default() -> Self {
        Self {
            backoff_base: 2.0,
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after sleeping for `delay`.
    Retry { delay: Duration },
    /// Give up and finalize the task as failed.
    Stop,
}

impl RetryPolicy {
    /// Retry iff the retry budget is not exhausted and shutdown has not
    /// been requested. Callers drive this from an explicit loop; the
    /// policy itself never recurses or sleeps.
    pub fn decide(
        &self,
        retry_count: u32,
        max_retries: u32,
        shutdown_requested: bool,
    ) -> RetryDecision {
        if shutdown_requested || retry_count >= max_retries {
            return RetryDecision::Stop;
        }
        RetryDecision::Retry {
            delay: self.backoff_delay(retry_count + 1),
        }
    }

    /// Delay before the given attempt (1-indexed): `base^attempt` seconds,
    /// capped at `max_backoff`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let secs = self.backoff_base.powi(attempt.min(i32::MAX as u32) as i32);
        Duration::from_secs_f64(secs).min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retries_until_budget_exhausted() {
        let policy = RetryPolicy::default();
        assert!(matches!(
            policy.decide(0, 3, false),
            RetryDecision::Retry { .. }
        ));
        assert!(matches!(
            policy.decide(2, 3, false),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(policy.decide(3, 3, false), RetryDecision::Stop);
    }

    #[test]
    fn test_zero_budget_never_retries() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(0, 0, false), RetryDecision::Stop);
    }

    #[test]
    fn test_shutdown_suppresses_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(0, 3, true), RetryDecision::Stop);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(8));
        // 2^4 = 16 exceeds the 10s cap
        assert_eq!(policy.backoff_delay(4), Duration::from_secs(10));
        assert_eq!(policy.backoff_delay(30), Duration::from_secs(10));
    }

    #[test]
    fn test_decide_reports_delay_for_next_attempt() {
        let policy = RetryPolicy::default();
        match policy.decide(1, 5, false) {
            RetryDecision::Retry { delay } => assert_eq!(delay, Duration::from_secs(4)),
            RetryDecision::Stop => panic!("expected retry"),
        }
    }
}
