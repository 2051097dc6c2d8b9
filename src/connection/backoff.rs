//! Reconnect backoff
//!
//! Linear: each attempt waits one more step, up to a cap. The backend
//! executes the delay; the policy only computes and logs it.

use std::time::Duration;
use tracing::debug;

/// Default delay added per reconnect attempt
pub const DEFAULT_RECONNECT_STEP: Duration = Duration::from_millis(500);

/// Default ceiling for a single reconnect delay
pub const DEFAULT_RECONNECT_MAX: Duration = Duration::from_millis(30_000);

/// Linear reconnect delay policy handed to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    step: Duration,
    max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_STEP, DEFAULT_RECONNECT_MAX)
    }
}

impl ReconnectPolicy {
    pub fn new(step: Duration, max: Duration) -> Self {
        Self { step, max }
    }

    /// Delay before reconnect attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt).min(self.max)
    }

    /// Delay for `attempt`, logged as the backend is about to wait it out
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        debug!(attempt, "reconnecting in {}ms (attempt {})", delay.as_millis(), attempt);
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff_with_cap() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(10), Duration::from_millis(5_000));
        assert_eq!(policy.delay_for(60), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for(100), Duration::from_millis(30_000));
    }

    #[test]
    fn test_zero_attempt_and_overflow() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(u32::MAX), DEFAULT_RECONNECT_MAX);
    }

    #[test]
    fn test_next_delay_matches_delay_for() {
        let policy = ReconnectPolicy::new(Duration::from_millis(10), Duration::from_millis(25));
        assert_eq!(policy.next_delay(2), Duration::from_millis(20));
        assert_eq!(policy.next_delay(3), Duration::from_millis(25));
    }
}
