//! Fixed-delay retry schedule for connection attempts.
//!
//! The booth link retries forever with the same pause between attempts;
//! handshake failures and broker refusals are treated alike. The schedule
//! only counts attempts so log lines can say which one failed.
//!
//! ```ignore
//! let mut retry = RetryPolicy::new(Duration::from_secs(2));
//! let delay = retry.next_sleep(); // 2s, attempt 1
//! let delay = retry.next_sleep(); // 2s, attempt 2
//! ```

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    delay: Duration,

    /// Failed attempts so far.
    attempt: u64,
}

impl RetryPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay, attempt: 0 }
    }

    /// Records a failed attempt and returns how long to wait before the next one.
    pub fn next_sleep(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        self.delay
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_is_constant() {
        let mut retry = RetryPolicy::new(Duration::from_secs(3));
        for expected_attempt in 1..=50 {
            assert_eq!(retry.next_sleep(), Duration::from_secs(3));
            assert_eq!(retry.attempt(), expected_attempt);
        }
    }

    #[test]
    fn test_starts_without_attempts() {
        let retry = RetryPolicy::new(Duration::from_secs(2));
        assert_eq!(retry.attempt(), 0);
    }
}
