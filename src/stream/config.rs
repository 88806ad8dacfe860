//! Stream client configuration and backoff policy.

use crate::error::{Error, Result};
use std::time::Duration;

/// Default connect timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10_000;

/// Default heartbeat (ping) interval in milliseconds.
pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = 30_000;

/// Delay after open before the filter payload is sent, in milliseconds.
///
/// Gives the server time to finish provisioning the session before it
/// receives the subscribe message.
pub const DEFAULT_SETTLE_DELAY: u64 = 500;

/// Minimum time a connection must stay open to count as stable, in
/// milliseconds.
pub const DEFAULT_STABILITY_WINDOW: u64 = 5_000;

/// Debounce delay before tearing down an unused connection, in
/// milliseconds. Absorbs rapid unsubscribe/subscribe pairs from UI churn.
pub const DEFAULT_TEARDOWN_DEBOUNCE: u64 = 100;

/// Global minimum delay between connection attempts, in milliseconds.
pub const DEFAULT_MIN_RECONNECT_DELAY: u64 = 10_000;

/// Maximum reconnection attempts since the last stable open.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Consecutive failures that trip the circuit breaker.
pub const DEFAULT_MAX_FAILURES: u32 = 3;

/// Circuit breaker cooldown window in milliseconds.
pub const DEFAULT_CIRCUIT_BREAKER_TIMEOUT: u64 = 30_000;

/// Event buffer capacity.
pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

/// Flat backoff floor for unstable-connection failures, in milliseconds.
pub const DEFAULT_UNSTABLE_BACKOFF_BASE: u64 = 20_000;

/// Backoff ceiling in milliseconds.
pub const DEFAULT_MAX_BACKOFF: u64 = 60_000;

/// Stream client configuration.
///
/// Defaults reproduce the production tuning: 10 s connect timeout, 30 s
/// heartbeat, 5 s stability window, 3-failure circuit breaker with a 30 s
/// cooldown, and a 10 000-event buffer.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Endpoint URL of the event stream server.
    pub url: String,
    /// Connection timeout in milliseconds.
    pub connect_timeout: u64,
    /// Heartbeat (ping) interval in milliseconds.
    pub heartbeat_interval: u64,
    /// Post-open settle delay before sending the filter payload, in
    /// milliseconds.
    pub settle_delay: u64,
    /// Minimum open lifetime for a connection to count as stable, in
    /// milliseconds.
    pub stability_window: u64,
    /// Debounce before tearing down a connection with no listeners, in
    /// milliseconds.
    pub teardown_debounce: u64,
    /// Global minimum delay between connection attempts, in milliseconds.
    pub min_reconnect_delay: u64,
    /// Maximum reconnection attempts since the last stable open.
    pub max_reconnect_attempts: u32,
    /// Consecutive failures that trip the circuit breaker.
    pub max_failures: u32,
    /// Circuit breaker cooldown window in milliseconds.
    pub circuit_breaker_timeout: u64,
    /// Event buffer capacity.
    pub buffer_capacity: usize,
    /// Backoff configuration.
    pub backoff: BackoffPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
            stability_window: DEFAULT_STABILITY_WINDOW,
            teardown_debounce: DEFAULT_TEARDOWN_DEBOUNCE,
            min_reconnect_delay: DEFAULT_MIN_RECONNECT_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            max_failures: DEFAULT_MAX_FAILURES,
            circuit_breaker_timeout: DEFAULT_CIRCUIT_BREAKER_TIMEOUT,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl StreamConfig {
    /// Creates a configuration for the given endpoint URL with all other
    /// settings at their defaults.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(Error::invalid_request("url must not be empty"));
        }
        if self.buffer_capacity == 0 {
            return Err(Error::invalid_request("buffer_capacity must be greater than 0"));
        }
        if self.max_failures == 0 {
            return Err(Error::invalid_request("max_failures must be greater than 0"));
        }
        if self.stability_window == 0 {
            return Err(Error::invalid_request(
                "stability_window must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Backoff policy: maps (attempt count, connection stability) to the wait
/// duration before the next retry.
///
/// Failures of a connection that never stabilized use a flat, slowly
/// growing floor — the fault is likely structural (bad URL, server down)
/// rather than transient. Failures after a stable session use classic
/// exponential backoff. Both branches are clamped to `max_delay`, and
/// nothing ever schedules below `min_delay` (no reconnection storms).
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Floor and base for the stable (exponential) branch, in milliseconds.
    pub min_delay: u64,
    /// Floor and step for the unstable (flat) branch, in milliseconds.
    pub unstable_base: u64,
    /// Ceiling for both branches, in milliseconds.
    pub max_delay: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            min_delay: DEFAULT_MIN_RECONNECT_DELAY,
            unstable_base: DEFAULT_UNSTABLE_BACKOFF_BASE,
            max_delay: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay before retry number `attempt` (0-indexed).
    ///
    /// `was_unstable` selects the flat structural-failure branch.
    pub fn delay(&self, attempt: u32, was_unstable: bool) -> Duration {
        let ms = if was_unstable {
            let step = self.unstable_base.saturating_mul(u64::from(attempt) + 1);
            step.clamp(self.unstable_base, self.max_delay)
        } else {
            let exp = 2u64
                .checked_pow(attempt)
                .and_then(|f| self.min_delay.checked_mul(f))
                .unwrap_or(self.max_delay);
            exp.clamp(self.min_delay, self.max_delay)
        };
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_config_default() {
        let config = StreamConfig::default();
        assert_eq!(config.connect_timeout, 10_000);
        assert_eq!(config.heartbeat_interval, 30_000);
        assert_eq!(config.stability_window, 5_000);
        assert_eq!(config.teardown_debounce, 100);
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.max_failures, 3);
        assert_eq!(config.circuit_breaker_timeout, 30_000);
        assert_eq!(config.buffer_capacity, 10_000);
    }

    #[test]
    fn test_config_validation() {
        assert!(StreamConfig::default().validate().is_err());
        assert!(StreamConfig::new("ws://localhost:8000/ws/events").validate().is_ok());

        let config = StreamConfig {
            buffer_capacity: 0,
            ..StreamConfig::new("ws://localhost:8000/ws/events")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_stable_branch_is_exponential() {
        let backoff = BackoffPolicy::default();
        assert_eq!(backoff.delay(0, false), Duration::from_millis(10_000));
        assert_eq!(backoff.delay(1, false), Duration::from_millis(20_000));
        assert_eq!(backoff.delay(2, false), Duration::from_millis(40_000));
        // Clamped to the ceiling.
        assert_eq!(backoff.delay(3, false), Duration::from_millis(60_000));
        assert_eq!(backoff.delay(30, false), Duration::from_millis(60_000));
    }

    #[test]
    fn test_backoff_unstable_branch_is_flat() {
        let backoff = BackoffPolicy::default();
        assert_eq!(backoff.delay(0, true), Duration::from_millis(20_000));
        assert_eq!(backoff.delay(1, true), Duration::from_millis(40_000));
        assert_eq!(backoff.delay(2, true), Duration::from_millis(60_000));
        assert_eq!(backoff.delay(5, true), Duration::from_millis(60_000));
    }

    #[test]
    fn test_backoff_never_below_global_minimum() {
        let backoff = BackoffPolicy::default();
        for attempt in 0..10 {
            for unstable in [false, true] {
                assert!(backoff.delay(attempt, unstable) >= Duration::from_millis(10_000));
            }
        }
    }

    #[test]
    fn test_backoff_overflow_saturates_at_ceiling() {
        let backoff = BackoffPolicy::default();
        assert_eq!(backoff.delay(u32::MAX, false), Duration::from_millis(60_000));
        assert_eq!(backoff.delay(u32::MAX, true), Duration::from_millis(60_000));
    }
}
