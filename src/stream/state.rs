//! Connection state, failure bookkeeping, and statistics.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Close codes treated as a normal, expected closure (RFC 6455 1000
/// "normal" and 1001 "going away"). A clean closure resets the failure
/// counter and never schedules a reconnect.
pub const CLEAN_CLOSE_CODES: [u16; 2] = [1000, 1001];

/// Connection lifecycle state.
///
/// Exactly one instance exists per client, owned by the connection actor
/// and mirrored into an atomic for lock-free reads from the handle.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and nothing scheduled.
    Idle = 0,
    /// A transport open is in flight.
    Connecting = 1,
    /// Open, but not yet past the minimum stability window.
    OpenUnstable = 2,
    /// Open and past the stability window; retry budget has been restored.
    OpenStable = 3,
    /// Tearing down after a close or error.
    Closing = 4,
    /// Waiting out a backoff delay before the next attempt.
    BackoffWait = 5,
    /// Circuit breaker is open; all attempts suspended for the cooldown.
    CircuitOpen = 6,
    /// Explicitly disconnected; no automatic transitions follow.
    ManuallyClosed = 7,
}

impl ConnectionState {
    /// Converts a `u8` value to a `ConnectionState`.
    #[inline]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::OpenUnstable,
            3 => Self::OpenStable,
            4 => Self::Closing,
            5 => Self::BackoffWait,
            6 => Self::CircuitOpen,
            7 => Self::ManuallyClosed,
            _ => Self::Idle,
        }
    }

    /// Converts the state to its `u8` representation.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether the transport is currently open.
    #[inline]
    pub fn is_open(self) -> bool {
        matches!(self, Self::OpenUnstable | Self::OpenStable)
    }
}

/// Failure classification for a closed or failed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Peer closed cleanly (normal close code). No retry; counters reset.
    Clean,
    /// Abnormal closure after a stable session. Standard exponential
    /// backoff.
    Transient,
    /// Abnormal closure before the connection ever stabilized (or a
    /// connect attempt that never opened). Flat, higher backoff floor.
    Structural,
}

impl FailureClass {
    /// Selects the unstable backoff branch.
    #[inline]
    pub fn was_unstable(self) -> bool {
        matches!(self, Self::Structural)
    }
}

/// Classifies a close/error event.
///
/// `lifetime` is the time the connection spent open (zero if it never
/// opened). A lifetime that is positive but shorter than the stability
/// window marks the endpoint as structurally suspect; a connect attempt
/// that never opened stays on the standard branch.
pub fn classify_close(
    close_code: Option<u16>,
    lifetime: Duration,
    stability_window: Duration,
) -> FailureClass {
    if close_code.is_some_and(|code| CLEAN_CLOSE_CODES.contains(&code)) {
        return FailureClass::Clean;
    }
    if !lifetime.is_zero() && lifetime < stability_window {
        FailureClass::Structural
    } else {
        FailureClass::Transient
    }
}

/// Consecutive-failure bookkeeping.
///
/// Mutated only by the connection actor on close/error events; reset on a
/// stable open or a manual/clean close.
#[derive(Debug, Default)]
pub struct FailureRecord {
    /// Consecutive non-clean failures.
    pub consecutive_failures: u32,
    /// When the last failure was recorded.
    pub last_failure_at: Option<Instant>,
    /// When the connection last reached `OpenStable`.
    pub last_stable_open_at: Option<Instant>,
}

impl FailureRecord {
    /// Records one more consecutive failure and returns the new count.
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures += 1;
        self.last_failure_at = Some(Instant::now());
        self.consecutive_failures
    }

    /// Marks a stable open: failures forgotten, stamp recorded.
    pub fn record_stable_open(&mut self) {
        self.consecutive_failures = 0;
        self.last_stable_open_at = Some(Instant::now());
    }

    /// Resets the failure count (clean or manual close).
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }
}

/// Stream statistics (lock-free).
#[derive(Debug, Default)]
pub struct StreamStats {
    events_received: AtomicU64,
    control_received: AtomicU64,
    malformed_dropped: AtomicU64,
    pings_sent: AtomicU64,
    reconnects: AtomicU64,
    connected_at: AtomicI64,
}

impl StreamStats {
    /// Creates a zeroed stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a delivered domain event.
    pub fn record_event(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a consumed control message.
    pub fn record_control(&self) {
        self.control_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a dropped malformed frame.
    pub fn record_malformed(&self) {
        self.malformed_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a heartbeat probe sent.
    pub fn record_ping(&self) {
        self.pings_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a reconnection attempt.
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful open (wall-clock milliseconds).
    pub fn record_connected(&self) {
        self.connected_at
            .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Creates an immutable snapshot of the current statistics.
    pub fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            control_received: self.control_received.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            pings_sent: self.pings_sent.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            connected_at: self.connected_at.load(Ordering::Relaxed),
        }
    }

    /// Resets all statistics.
    pub fn reset(&self) {
        self.events_received.store(0, Ordering::Relaxed);
        self.control_received.store(0, Ordering::Relaxed);
        self.malformed_dropped.store(0, Ordering::Relaxed);
        self.pings_sent.store(0, Ordering::Relaxed);
        self.reconnects.store(0, Ordering::Relaxed);
        self.connected_at.store(0, Ordering::Relaxed);
    }
}

/// Immutable snapshot of stream statistics.
#[derive(Debug, Clone, Default)]
pub struct StreamStatsSnapshot {
    /// Domain events delivered to consumers.
    pub events_received: u64,
    /// Control messages consumed internally.
    pub control_received: u64,
    /// Malformed frames dropped.
    pub malformed_dropped: u64,
    /// Heartbeat probes sent.
    pub pings_sent: u64,
    /// Reconnection attempts made.
    pub reconnects: u64,
    /// Last successful open, wall-clock milliseconds (0 if never).
    pub connected_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        for state in [
            ConnectionState::Idle,
            ConnectionState::Connecting,
            ConnectionState::OpenUnstable,
            ConnectionState::OpenStable,
            ConnectionState::Closing,
            ConnectionState::BackoffWait,
            ConnectionState::CircuitOpen,
            ConnectionState::ManuallyClosed,
        ] {
            assert_eq!(ConnectionState::from_u8(state.as_u8()), state);
        }
        assert_eq!(ConnectionState::from_u8(255), ConnectionState::Idle);
    }

    #[test]
    fn test_is_open() {
        assert!(ConnectionState::OpenUnstable.is_open());
        assert!(ConnectionState::OpenStable.is_open());
        assert!(!ConnectionState::Connecting.is_open());
        assert!(!ConnectionState::BackoffWait.is_open());
    }

    #[test]
    fn test_classify_clean_close() {
        let window = Duration::from_secs(5);
        assert_eq!(
            classify_close(Some(1000), Duration::from_secs(60), window),
            FailureClass::Clean
        );
        // A clean code wins even when the connection was short-lived.
        assert_eq!(
            classify_close(Some(1001), Duration::from_secs(1), window),
            FailureClass::Clean
        );
    }

    #[test]
    fn test_classify_unstable_close() {
        let window = Duration::from_secs(5);
        assert_eq!(
            classify_close(Some(1006), Duration::from_secs(2), window),
            FailureClass::Structural
        );
        assert_eq!(
            classify_close(None, Duration::from_millis(4_999), window),
            FailureClass::Structural
        );
    }

    #[test]
    fn test_classify_stable_close() {
        let window = Duration::from_secs(5);
        assert_eq!(
            classify_close(Some(1006), Duration::from_secs(10), window),
            FailureClass::Transient
        );
        // Exactly at the window counts as stable.
        assert_eq!(
            classify_close(None, Duration::from_secs(5), window),
            FailureClass::Transient
        );
        // Never opened: standard branch, not the unstable one.
        assert_eq!(
            classify_close(None, Duration::ZERO, window),
            FailureClass::Transient
        );
    }

    #[test]
    fn test_failure_record() {
        let mut record = FailureRecord::default();
        assert_eq!(record.record_failure(), 1);
        assert_eq!(record.record_failure(), 2);
        record.reset();
        assert_eq!(record.consecutive_failures, 0);

        record.record_failure();
        record.record_stable_open();
        assert_eq!(record.consecutive_failures, 0);
        assert!(record.last_stable_open_at.is_some());
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = StreamStats::new();
        stats.record_event();
        stats.record_event();
        stats.record_control();
        stats.record_malformed();
        stats.record_ping();

        let snap = stats.snapshot();
        assert_eq!(snap.events_received, 2);
        assert_eq!(snap.control_received, 1);
        assert_eq!(snap.malformed_dropped, 1);
        assert_eq!(snap.pings_sent, 1);

        stats.reset();
        assert_eq!(stats.snapshot().events_received, 0);
    }
}
