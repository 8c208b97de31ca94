// ── Reconnection policy ──
//
// Exponential backoff shared by the connect loop and the reconnection
// controller. Each owner keeps its own `Backoff` so their counters stay
// independent.

use std::time::Duration;

/// Exponential backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay after the first failure. Default: 2s.
    pub initial_delay: Duration,

    /// Upper bound on the delay. Default: 60s.
    pub max_delay: Duration,

    /// Connect attempts before `connect()` gives up. Default: 20.
    pub max_retries: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            max_retries: 20,
        }
    }
}

/// `delay = min(initial * 2^attempt, max)`
///
/// No jitter: a single process talks to a single panel.
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    config
        .initial_delay
        .checked_mul(factor)
        .unwrap_or(config.max_delay)
        .min(config.max_delay)
}

/// Retry counter plus the delay it implies.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Failures recorded since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Delay to wait after the current failure; advances the counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = calculate_backoff(self.attempt, &self.config);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= self.config.max_retries
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(2));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert_eq!(config.max_retries, 20);
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let mut backoff = Backoff::new(ReconnectConfig::default());
        let delays: Vec<u64> = (0..8).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 32, 60, 60, 60]);
    }

    #[test]
    fn backoff_is_monotonic_and_resets() {
        let mut backoff = Backoff::new(ReconnectConfig::default());
        let mut last = Duration::ZERO;
        for _ in 0..40 {
            let d = backoff.next_delay();
            assert!(d >= last);
            last = d;
        }
        assert!(backoff.exhausted());

        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        assert_eq!(
            calculate_backoff(200, &ReconnectConfig::default()),
            Duration::from_secs(60)
        );
    }
}
