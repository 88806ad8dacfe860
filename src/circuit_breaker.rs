//! Circuit breaker for pacing reconnection attempts.
//!
//! After a burst of consecutive connection failures the circuit "trips"
//! open and all reconnection attempts are suspended for a cooldown window,
//! regardless of what the backoff policy would otherwise allow. Once the
//! cooldown elapses the breaker half-closes: the failure burst is forgotten
//! and one fresh attempt cycle is allowed, with no guarantee of success.
//!
//! Unlike a request-level breaker this is a binary open/closed pacing
//! device; consumers never observe it directly — while the circuit is open
//! they simply see "disconnected".
//!
//! ```text
//! ┌────────┐   trip()                       ┌──────┐
//! │ Closed │ ─────────────────────────────▶ │ Open │
//! └────────┘                                └──────┘
//!      ▲        try_pass() after cooldown       │
//!      └────────────────────────────────────────┘
//! ```
//!
//! The breaker is owned exclusively by the connection actor, so it is a
//! plain struct; time is measured with `tokio::time::Instant` so paused-
//! clock tests observe exact cooldowns.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Binary circuit breaker with a cooldown window.
#[derive(Debug)]
pub struct CircuitBreaker {
    opened_at: Option<Instant>,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// Creates a closed breaker with the given cooldown window.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            opened_at: None,
            cooldown,
        }
    }

    /// Returns `true` while the circuit is open.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.opened_at.is_some()
    }

    /// Trips the circuit open, stamping the open time. No-op if already
    /// open (the original open timestamp is kept).
    pub fn trip(&mut self) {
        if self.opened_at.is_none() {
            warn!(cooldown_ms = self.cooldown.as_millis() as u64, "Circuit breaker tripped open");
            self.opened_at = Some(Instant::now());
        }
    }

    /// Checks whether an attempt may proceed.
    ///
    /// Closed: always passes. Open: passes only once the cooldown window
    /// has elapsed, in which case the breaker half-closes (resets to
    /// closed) and the caller gets one fresh attempt cycle.
    pub fn try_pass(&mut self) -> bool {
        match self.opened_at {
            None => true,
            Some(opened_at) => {
                let elapsed = opened_at.elapsed();
                if elapsed >= self.cooldown {
                    info!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Circuit breaker cooldown elapsed, half-closing"
                    );
                    self.opened_at = None;
                    true
                } else {
                    debug!(
                        remaining_ms = (self.cooldown - elapsed).as_millis() as u64,
                        "Circuit breaker open, attempt suppressed"
                    );
                    false
                }
            }
        }
    }

    /// Remaining cooldown, if the circuit is open.
    pub fn remaining(&self) -> Option<Duration> {
        self.opened_at
            .map(|t| self.cooldown.saturating_sub(t.elapsed()))
    }

    /// Force-closes the breaker (manual disconnect, clean closure).
    pub fn reset(&mut self) {
        if self.opened_at.take().is_some() {
            info!("Circuit breaker reset to closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaker_starts_closed() {
        let breaker = CircuitBreaker::new(Duration::from_secs(30));
        assert!(!breaker.is_open());
        assert_eq!(breaker.remaining(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trip_blocks_until_cooldown() {
        let mut breaker = CircuitBreaker::new(Duration::from_secs(30));
        breaker.trip();
        assert!(breaker.is_open());
        assert!(!breaker.try_pass());

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!breaker.try_pass());
        assert!(breaker.remaining().unwrap() <= Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(breaker.try_pass());
        assert!(!breaker.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trip_is_idempotent_while_open() {
        let mut breaker = CircuitBreaker::new(Duration::from_secs(30));
        breaker.trip();
        tokio::time::advance(Duration::from_secs(20)).await;
        // A second trip while open must not extend the window.
        breaker.trip();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(breaker.try_pass());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_closes_immediately() {
        let mut breaker = CircuitBreaker::new(Duration::from_secs(30));
        breaker.trip();
        breaker.reset();
        assert!(!breaker.is_open());
        assert!(breaker.try_pass());
    }
}
