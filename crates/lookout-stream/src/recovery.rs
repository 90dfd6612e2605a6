//! Reconnect policy for a stream that stopped producing frames.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Consecutive failed reconnects tolerated; 0 disables reconnecting.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Exponential backoff between reconnect attempts.
#[derive(Debug)]
pub struct ReconnectState {
    policy: ReconnectPolicy,
    consecutive_failures: u32,
    current_backoff: Duration,
    total_reconnects: u64,
}

impl ReconnectState {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            current_backoff: policy.initial_backoff,
            policy,
            consecutive_failures: 0,
            total_reconnects: 0,
        }
    }

    /// A frame arrived: forget earlier failures.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.current_backoff = self.policy.initial_backoff;
    }

    /// The stream failed. Returns how long to wait before the next reconnect,
    /// or `None` once the attempt budget is spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.exhausted() {
            return None;
        }
        self.consecutive_failures += 1;
        self.total_reconnects += 1;

        let wait = self.current_backoff;
        self.current_backoff = (self.current_backoff * 2).min(self.policy.max_backoff);
        Some(wait)
    }

    pub fn exhausted(&self) -> bool {
        self.consecutive_failures >= self.policy.max_attempts
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn total_reconnects(&self) -> u64 {
        self.total_reconnects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let mut state = ReconnectState::new(policy(10));
        let waits: Vec<u64> = (0..5)
            .filter_map(|_| state.next_backoff())
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(waits, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn test_budget_exhausts() {
        let mut state = ReconnectState::new(policy(2));
        assert!(state.next_backoff().is_some());
        assert!(state.next_backoff().is_some());
        assert!(state.exhausted());
        assert!(state.next_backoff().is_none());
        assert_eq!(state.total_reconnects(), 2);
    }

    #[test]
    fn test_zero_attempts_never_reconnects() {
        let mut state = ReconnectState::new(policy(0));
        assert!(state.next_backoff().is_none());
    }

    #[test]
    fn test_success_resets_failures_and_backoff() {
        let mut state = ReconnectState::new(policy(3));
        state.next_backoff();
        state.next_backoff();
        state.record_success();
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.next_backoff(), Some(Duration::from_millis(100)));
        assert_eq!(state.total_reconnects(), 3);
    }
}
