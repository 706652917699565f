//! Reconnect delays for the cluster subscription

use std::time::Duration;

use rand::Rng;

use crate::config::ClusterConfig;

/// Delays are spread by up to this fraction either way
const JITTER: f64 = 0.1;

/// Doubling delay between resubscribe attempts, capped at `max`.
#[derive(Debug, Clone)]
pub(crate) struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl ReconnectBackoff {
    pub(crate) fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        Self {
            initial,
            max: max.max(initial),
            attempt: 0,
        }
    }

    pub(crate) fn from_config(config: &ClusterConfig) -> Self {
        Self::new(
            Duration::from_millis(config.reconnect_initial_ms),
            Duration::from_millis(config.reconnect_max_ms),
        )
    }

    /// Delay before the next attempt, without jitter.
    fn base_delay(&self) -> Duration {
        let factor = 1u32 << self.attempt.min(31);
        self.initial.saturating_mul(factor).min(self.max)
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let base = self.base_delay();
        self.attempt = self.attempt.saturating_add(1);

        let spread = rand::rng().random_range(-JITTER..=JITTER);
        base.mul_f64(1.0 + spread).min(self.max)
    }

    /// Called once the subscription is healthy again
    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }

    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff(initial_ms: u64, max_ms: u64) -> ReconnectBackoff {
        ReconnectBackoff::new(Duration::from_millis(initial_ms), Duration::from_millis(max_ms))
    }

    #[test]
    fn test_base_delay_doubles_until_capped() {
        let mut backoff = backoff(100, 500);
        let mut delays = Vec::new();
        for _ in 0..5 {
            delays.push(backoff.base_delay().as_millis());
            backoff.next_delay();
        }
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
        assert_eq!(backoff.attempt(), 5);
    }

    #[test]
    fn test_jitter_stays_near_base() {
        let mut backoff = backoff(1_000, 60_000);
        let delay = backoff.next_delay().as_millis();
        assert!((900..=1_100).contains(&delay), "delay {delay}");
    }

    #[test]
    fn test_reset_restarts_from_initial() {
        let mut backoff = backoff(100, 10_000);
        backoff.next_delay();
        backoff.next_delay();

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.base_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_from_config() {
        let config = ClusterConfig {
            reconnect_initial_ms: 250,
            reconnect_max_ms: 100,
            ..Default::default()
        };
        let backoff = ReconnectBackoff::from_config(&config);
        // A max below the initial delay is raised to it
        assert_eq!(backoff.base_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_many_attempts_do_not_overflow() {
        let mut backoff = backoff(100, 30_000);
        for _ in 0..100 {
            assert!(backoff.next_delay() <= Duration::from_millis(30_000));
        }
    }
}
