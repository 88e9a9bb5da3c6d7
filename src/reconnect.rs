//! Exponential reconnect backoff.
//!
//! [`ReconnectPolicy`] only computes delays; the caller's supervising loop
//! does the sleeping and calls [`FChatSession::connect`](crate::session::FChatSession::connect)
//! again.
//!
//! ```
//! use fchat_session::reconnect::ReconnectPolicy;
//! use std::time::Duration;
//!
//! let mut policy = ReconnectPolicy::new();
//! policy.on_failure();
//! policy.on_failure();
//! assert_eq!(policy.next_delay(), Duration::from_secs(2));
//! policy.on_success();
//! assert_eq!(policy.attempt(), 0);
//! ```

use std::time::Duration;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(120);

/// Backoff state: delay doubles per consecutive failure, capped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    base: Duration,
    max: Duration,
    delay: Duration,
    attempt: u32,
}

impl ReconnectPolicy {
    /// Policy starting at 1 second and capped at 120 seconds.
    pub fn new() -> Self {
        Self {
            base: DEFAULT_BASE_DELAY,
            max: DEFAULT_MAX_DELAY,
            delay: DEFAULT_BASE_DELAY,
            attempt: 0,
        }
    }

    /// Set the delay used after the first failure and after every success.
    #[must_use]
    pub fn with_base_delay(mut self, base: Duration) -> Self {
        self.base = base;
        self.delay = base.min(self.max);
        self
    }

    /// Set the delay ceiling.
    #[must_use]
    pub fn with_max_delay(mut self, max: Duration) -> Self {
        self.max = max;
        self.delay = self.delay.min(max);
        self
    }

    /// How long to wait before the next attempt.
    pub fn next_delay(&self) -> Duration {
        self.delay
    }

    /// Consecutive failures since the last success.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record a failed attempt.
    pub fn on_failure(&mut self) {
        if self.attempt > 0 {
            self.delay = self.delay.saturating_mul(2).min(self.max);
        }
        self.attempt = self.attempt.saturating_add(1);
    }

    /// Record a successful connection.
    pub fn on_success(&mut self) {
        self.delay = self.base.min(self.max);
        self.attempt = 0;
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_failure() {
        let mut policy = ReconnectPolicy::new();
        let delays: Vec<u64> = (0..5)
            .map(|_| {
                policy.on_failure();
                policy.next_delay().as_secs()
            })
            .collect();
        assert_eq!(delays, [1, 2, 4, 8, 16]);
        assert_eq!(policy.attempt(), 5);
    }

    #[test]
    fn success_resets() {
        let mut policy = ReconnectPolicy::new();
        for _ in 0..4 {
            policy.on_failure();
        }
        policy.on_success();
        assert_eq!(policy.next_delay(), Duration::from_secs(1));
        assert_eq!(policy.attempt(), 0);

        policy.on_failure();
        assert_eq!(policy.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn never_exceeds_cap() {
        let mut policy = ReconnectPolicy::new();
        for _ in 0..64 {
            policy.on_failure();
            assert!(policy.next_delay() <= Duration::from_secs(120));
        }
        assert_eq!(policy.next_delay(), Duration::from_secs(120));
    }

    #[test]
    fn custom_bounds() {
        let mut policy = ReconnectPolicy::new()
            .with_base_delay(Duration::from_millis(250))
            .with_max_delay(Duration::from_secs(1));
        for _ in 0..4 {
            policy.on_failure();
        }
        assert_eq!(policy.next_delay(), Duration::from_secs(1));
        policy.on_success();
        assert_eq!(policy.next_delay(), Duration::from_millis(250));
    }
}
