//! Reconnection Policy
//!
//! Deterministic linear backoff: every scheduled reconnect first grows the
//! timeout by a fixed increment, clamped to a maximum. With backoff off the
//! timeout stays constant (and at least one second). No jitter, so observers
//! can assert on the announced delays.

use std::time::Duration;

/// Floor applied to the timeout when backoff is disabled.
pub const MIN_CONSTANT_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Reconnect after a transient close.
    pub enabled: bool,
    /// Grow the timeout on each attempt.
    pub backoff: bool,
    /// Seed timeout.
    pub initial_timeout: Duration,
    /// Growth per attempt.
    pub backoff_increment: Duration,
    /// Upper bound on the timeout.
    pub max_timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backoff: true,
            initial_timeout: Duration::ZERO,
            backoff_increment: Duration::from_millis(500),
            max_timeout: Duration::from_secs(30),
        }
    }
}

impl ReconnectConfig {
    /// Disable reconnection entirely.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            backoff: true,
            initial_timeout: Duration::ZERO,
            backoff_increment: Duration::from_millis(500),
            max_timeout: Duration::from_secs(30),
        }
    }

    /// Timeout the policy starts from.
    #[must_use]
    pub fn seed(&self) -> Duration {
        if self.backoff {
            self.initial_timeout
        } else {
            self.initial_timeout.max(MIN_CONSTANT_TIMEOUT)
        }
    }
}

/// Reconnection policy with linear, clamped backoff.
///
/// ```rust
/// use alpaca_trade_api::infrastructure::alpaca::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig {
///     initial_timeout: Duration::from_secs(1),
///     backoff_increment: Duration::from_secs(2),
///     max_timeout: Duration::from_secs(10),
///     ..ReconnectConfig::default()
/// });
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(3)));
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    timeout: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        let timeout = config.seed();
        Self {
            config,
            timeout,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt, or `None` if reconnection is disabled.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.config.enabled {
            return None;
        }

        self.attempt_count = self.attempt_count.saturating_add(1);
        if self.config.backoff {
            self.timeout = self
                .timeout
                .saturating_add(self.config.backoff_increment)
                .min(self.config.max_timeout);
        }
        Some(self.timeout)
    }

    /// Reset the policy after a successful authentication.
    pub fn reset(&mut self) {
        self.timeout = self.config.seed();
        self.attempt_count = 0;
    }

    /// Attempts since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert!(config.enabled);
        assert!(config.backoff);
        assert_eq!(config.initial_timeout, Duration::ZERO);
        assert_eq!(config.backoff_increment, Duration::from_millis(500));
        assert_eq!(config.max_timeout, secs(30));
    }

    #[test]
    fn policy_linear_backoff_clamped() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            initial_timeout: secs(1),
            backoff_increment: secs(2),
            max_timeout: secs(10),
            ..ReconnectConfig::default()
        });

        let delays: Vec<_> = (0..6).filter_map(|_| policy.next_delay()).collect();
        assert_eq!(delays, [secs(3), secs(5), secs(7), secs(9), secs(10), secs(10)]);
        assert_eq!(policy.attempt_count(), 6);
    }

    #[test]
    fn policy_constant_without_backoff() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            backoff: false,
            initial_timeout: Duration::ZERO,
            ..ReconnectConfig::default()
        });

        assert_eq!(policy.next_delay(), Some(MIN_CONSTANT_TIMEOUT));
        assert_eq!(policy.next_delay(), Some(MIN_CONSTANT_TIMEOUT));

        let mut slow = ReconnectPolicy::new(ReconnectConfig {
            backoff: false,
            initial_timeout: secs(4),
            ..ReconnectConfig::default()
        });
        assert_eq!(slow.next_delay(), Some(secs(4)));
        assert_eq!(slow.next_delay(), Some(secs(4)));
    }

    #[test]
    fn policy_disabled() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::disabled());
        assert_eq!(policy.next_delay(), None);
        assert_eq!(policy.attempt_count(), 0);
    }

    #[test]
    fn policy_reset() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            initial_timeout: secs(1),
            backoff_increment: secs(1),
            max_timeout: secs(10),
            ..ReconnectConfig::default()
        });

        assert_eq!(policy.next_delay(), Some(secs(2)));
        assert_eq!(policy.next_delay(), Some(secs(3)));

        policy.reset();

        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(), Some(secs(2)));
    }
}
