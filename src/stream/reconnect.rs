//! Exponential-backoff reconnection bookkeeping.
//!
//! The manager owns the attempt counter and connectivity state; the pipeline
//! that owns the stream drives the actual sleep-and-reissue loop so that
//! application-level resume data (resume-from-category) can be attached to
//! the reissued request.

use std::time::Duration;

use tracing::{info, warn};

/// Backoff policy: `min(base * 2^attempt, cap)`, up to `max_attempts`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(10),
            max_attempts: 5,
        }
    }
}

/// Observable connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Connected,
    /// Currently waiting to retry; carries the 1-based attempt number.
    Reconnecting(u32),
    /// Backoff budget exhausted; only an explicit user retry continues.
    Disconnected,
}

#[derive(Debug)]
pub struct ReconnectionManager {
    config: BackoffConfig,
    attempt: u32,
    state: Connectivity,
}

impl ReconnectionManager {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempt: 0,
            state: Connectivity::Connected,
        }
    }

    pub fn state(&self) -> Connectivity {
        self.state
    }

    /// Reconnect attempts made since the last successful connection.
    pub fn attempts_made(&self) -> u32 {
        self.attempt
    }

    /// Delay for a given zero-based attempt under this policy.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.min(20);
        self.config
            .base
            .saturating_mul(1u32 << shift)
            .min(self.config.cap)
    }

    /// Register a stream failure. Returns the delay to wait before the next
    /// attempt, or `None` once the budget is exhausted (state becomes
    /// `Disconnected`).
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.max_attempts {
            warn!(attempts = self.attempt, "reconnect budget exhausted");
            self.state = Connectivity::Disconnected;
            return None;
        }
        let delay = self.delay_for(self.attempt);
        self.attempt += 1;
        self.state = Connectivity::Reconnecting(self.attempt);
        info!(attempt = self.attempt, ?delay, "scheduling reconnect");
        Some(delay)
    }

    /// Register a successful (re)connection; resets the attempt budget.
    pub fn mark_connected(&mut self) {
        if self.attempt > 0 {
            info!(after_attempts = self.attempt, "stream reconnected");
        }
        self.attempt = 0;
        self.state = Connectivity::Connected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BackoffConfig {
        BackoffConfig {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(1),
            max_attempts: 5,
        }
    }

    #[test]
    fn delays_double_from_base() {
        let mgr = ReconnectionManager::new(config());
        assert_eq!(mgr.delay_for(0), Duration::from_millis(100));
        assert_eq!(mgr.delay_for(1), Duration::from_millis(200));
        assert_eq!(mgr.delay_for(2), Duration::from_millis(400));
        assert_eq!(mgr.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn delays_are_capped() {
        let mgr = ReconnectionManager::new(config());
        assert_eq!(mgr.delay_for(4), Duration::from_secs(1));
        assert_eq!(mgr.delay_for(30), Duration::from_secs(1));
    }

    #[test]
    fn k_failures_yield_k_attempts_with_doubling_delays() {
        let mut mgr = ReconnectionManager::new(config());
        let mut delays = Vec::new();
        for _ in 0..3 {
            delays.push(mgr.next_delay().expect("within budget"));
        }
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
            ]
        );
        assert_eq!(mgr.attempts_made(), 3);
        assert_eq!(mgr.state(), Connectivity::Reconnecting(3));

        mgr.mark_connected();
        assert_eq!(mgr.state(), Connectivity::Connected);
        assert_eq!(mgr.attempts_made(), 0);
    }

    #[test]
    fn budget_exhaustion_disconnects() {
        let mut mgr = ReconnectionManager::new(config());
        for _ in 0..5 {
            assert!(mgr.next_delay().is_some());
        }
        assert_eq!(mgr.next_delay(), None);
        assert_eq!(mgr.state(), Connectivity::Disconnected);
    }

    #[test]
    fn success_resets_the_backoff_schedule() {
        let mut mgr = ReconnectionManager::new(config());
        mgr.next_delay();
        mgr.next_delay();
        mgr.mark_connected();
        assert_eq!(mgr.next_delay(), Some(Duration::from_millis(100)));
    }
}
