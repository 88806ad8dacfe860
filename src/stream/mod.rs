//! Resilient event-stream client.
//!
//! Keeps a single persistent duplex connection to an event-stream server
//! alive on behalf of many independent in-process consumers. Classifies
//! failures, paces retries through a backoff policy and a circuit breaker,
//! keeps the link warm with heartbeats, and fans received domain events out
//! to listeners through a bounded most-recent-first buffer.

mod buffer;
mod config;
mod event;
mod message;
mod registry;
mod state;
mod transport;

pub use buffer::EventBuffer;
pub use config::{
    BackoffPolicy, DEFAULT_BUFFER_CAPACITY, DEFAULT_CIRCUIT_BREAKER_TIMEOUT,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MAX_FAILURES,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_MIN_RECONNECT_DELAY, DEFAULT_SETTLE_DELAY,
    DEFAULT_STABILITY_WINDOW, DEFAULT_TEARDOWN_DEBOUNCE, StreamConfig,
};
pub use event::Inbound;
pub use message::OutboundMessage;
pub use registry::{
    ConnectCallback, DisconnectCallback, EventCallback, Listener, ListenerId, ListenerRegistry,
};
pub use state::{
    CLEAN_CLOSE_CODES, ConnectionState, FailureClass, FailureRecord, StreamStats,
    StreamStatsSnapshot, classify_close,
};
pub use transport::{Frame, Link, Transport, WsTransport};

use crate::circuit_breaker::CircuitBreaker;
use crate::error::{Error, Result};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// State shared between the actor and the public handle for lock-free
/// reads.
#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    listener_count: AtomicUsize,
    buffer: EventBuffer,
    stats: StreamStats,
}

/// Scheduled transitions re-entering the actor queue.
///
/// `seq` values captured at scheduling time invalidate firings that a
/// later state change has superseded.
#[derive(Debug, Clone, Copy)]
enum TimerEvent {
    /// Backoff delay elapsed.
    Retry { seq: u64 },
    /// Circuit breaker cooldown elapsed.
    CircuitCooldown { seq: u64 },
    /// Teardown debounce elapsed.
    Teardown { seq: u64 },
    /// Stability window elapsed for the current connection.
    Stability { seq: u64 },
    /// Post-open settle delay elapsed for the current connection.
    Settle { seq: u64 },
    /// Heartbeat tick for the current connection.
    Heartbeat { seq: u64 },
}

/// Everything the actor reacts to. Exactly one input is processed at a
/// time; no two transitions ever run concurrently.
enum Input {
    Subscribe(Listener),
    Unsubscribe(ListenerId),
    SetFilter(ListenerId, Value),
    Send(Value),
    Disconnect,
    Opened {
        seq: u64,
        outbound: mpsc::UnboundedSender<String>,
    },
    OpenFailed {
        seq: u64,
        error: Error,
    },
    Frame {
        seq: u64,
        frame: Frame,
    },
    Timer(TimerEvent),
}

/// Handle to the shared event-stream client.
///
/// Cheap to clone; all clones drive the same single physical connection.
/// Operations never return an error to the caller — connection trouble is
/// reported through listener callbacks and [`is_connected`].
///
/// [`is_connected`]: EventStreamClient::is_connected
///
/// # Example
///
/// ```rust,no_run
/// use eventlink::stream::{EventStreamClient, Listener, StreamConfig};
///
/// # fn demo() -> eventlink::error::Result<()> {
/// let client = EventStreamClient::new(StreamConfig::new("ws://localhost:8000/ws/events"))?;
///
/// let listener = Listener::new()
///     .on_connect(|| println!("connected"))
///     .on_event(|event| println!("event: {event}"));
/// let id = listener.id();
///
/// client.subscribe(listener);
/// // ... later
/// client.unsubscribe(id);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct EventStreamClient {
    shared: Arc<Shared>,
    input_tx: mpsc::UnboundedSender<Input>,
    cancel: CancellationToken,
}

impl EventStreamClient {
    /// Creates a client over the production WebSocket transport and starts
    /// its connection actor. No connection is opened until the first
    /// subscriber arrives.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: StreamConfig) -> Result<Self> {
        Self::with_transport(config, WsTransport)
    }

    /// Creates a client over a custom transport (tests inject a mock
    /// here).
    pub fn with_transport(config: StreamConfig, transport: impl Transport) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            state: AtomicU8::new(ConnectionState::Idle.as_u8()),
            listener_count: AtomicUsize::new(0),
            buffer: EventBuffer::new(config.buffer_capacity),
            stats: StreamStats::new(),
        });
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let breaker = CircuitBreaker::new(Duration::from_millis(config.circuit_breaker_timeout));

        let actor = ConnectionActor {
            config,
            transport: Arc::new(transport),
            shared: Arc::clone(&shared),
            input_tx: input_tx.clone(),
            cancel: cancel.clone(),
            state: ConnectionState::Idle,
            registry: ListenerRegistry::new(),
            failures: FailureRecord::default(),
            breaker,
            attempt: 0,
            conn_seq: 0,
            sched_seq: 0,
            conn_cancel: CancellationToken::new(),
            link_out: None,
            opened_at: None,
            last_attempt_ended_at: None,
        };
        tokio::spawn(actor.run(input_rx));

        Ok(Self {
            shared,
            input_tx,
            cancel,
        })
    }

    /// Registers a listener. Idempotent per listener identity; triggers a
    /// connection attempt if none is active. The current connection state
    /// is replayed to the new listener synchronously.
    pub fn subscribe(&self, listener: Listener) {
        let id = listener.id();
        if self.is_connected() {
            if let Some(cb) = &listener.on_connect {
                registry::invoke_guarded(id, "on_connect", || cb());
            }
        } else if let Some(cb) = &listener.on_disconnect {
            registry::invoke_guarded(id, "on_disconnect", || cb());
        }
        let _ = self.input_tx.send(Input::Subscribe(listener));
    }

    /// Removes a listener. When the last listener leaves, the connection
    /// is torn down after a short debounce so rapid unsubscribe/subscribe
    /// pairs from UI churn do not thrash the physical connection.
    pub fn unsubscribe(&self, id: ListenerId) {
        let _ = self.input_tx.send(Input::Unsubscribe(id));
    }

    /// Replaces a listener's filter payload. If connected, the new filter
    /// is sent to the server immediately; it is also re-sent after every
    /// reconnect.
    pub fn set_filter(&self, id: ListenerId, filters: Value) {
        let _ = self.input_tx.send(Input::SetFilter(id, filters));
    }

    /// Sends a payload to the server. Silently dropped when the connection
    /// is not open.
    pub fn send(&self, payload: Value) {
        let _ = self.input_tx.send(Input::Send(payload));
    }

    /// Forces the client into the manually-closed state. Idempotent; no
    /// automatic reconnection follows. Construct a fresh client to start
    /// over.
    pub fn disconnect(&self) {
        let _ = self.input_tx.send(Input::Disconnect);
    }

    /// Whether the connection is currently open.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Current connection state.
    #[inline]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Snapshot of the buffered domain events, newest first.
    pub fn events(&self) -> Vec<Value> {
        self.shared.buffer.snapshot()
    }

    /// Empties the event buffer without affecting the connection.
    pub fn clear_events(&self) {
        self.shared.buffer.clear();
    }

    /// The shared event buffer.
    pub fn buffer(&self) -> &EventBuffer {
        &self.shared.buffer
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.shared.listener_count.load(Ordering::Acquire)
    }

    /// Snapshot of stream statistics.
    pub fn stats(&self) -> StreamStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Disconnects and stops the connection actor. After shutdown the
    /// handle is inert.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// The serialized state machine. Owns the registry, counters, breaker, and
/// the live link; every transition is the handling of exactly one input.
struct ConnectionActor {
    config: StreamConfig,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    input_tx: mpsc::UnboundedSender<Input>,
    cancel: CancellationToken,

    state: ConnectionState,
    registry: ListenerRegistry,
    failures: FailureRecord,
    breaker: CircuitBreaker,
    /// Reconnect attempts since the last stable open.
    attempt: u32,
    /// Identifies the current physical connection; bumped on every new
    /// attempt and on teardown so stale transport inputs are discarded.
    conn_seq: u64,
    /// Validity epoch for scheduled transitions (retry, cooldown,
    /// teardown).
    sched_seq: u64,
    /// Cancels per-connection background tasks (heartbeat).
    conn_cancel: CancellationToken,
    link_out: Option<mpsc::UnboundedSender<String>>,
    opened_at: Option<Instant>,
    last_attempt_ended_at: Option<Instant>,
}

impl ConnectionActor {
    async fn run(mut self, mut input_rx: mpsc::UnboundedReceiver<Input>) {
        debug!("Connection actor started");
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    self.enter_manual_close("shutdown");
                    break;
                }
                input = input_rx.recv() => match input {
                    Some(input) => self.handle(input),
                    None => {
                        self.enter_manual_close("all handles dropped");
                        break;
                    }
                }
            }
        }
        debug!("Connection actor stopped");
    }

    fn handle(&mut self, input: Input) {
        match input {
            Input::Subscribe(listener) => self.on_subscribe(listener),
            Input::Unsubscribe(id) => self.on_unsubscribe(id),
            Input::SetFilter(id, filters) => self.on_set_filter(id, filters),
            Input::Send(payload) => self.on_send(payload),
            Input::Disconnect => self.enter_manual_close("explicit disconnect"),
            Input::Opened { seq, outbound } => self.on_opened(seq, outbound),
            Input::OpenFailed { seq, error } => self.on_open_failed(seq, &error),
            Input::Frame { seq, frame } => self.on_frame(seq, frame),
            Input::Timer(event) => self.on_timer(event),
        }
    }

    // ---- consumer operations ----

    fn on_subscribe(&mut self, listener: Listener) {
        let id = listener.id();
        let filter = listener.filter.clone();
        if !self.registry.insert(listener) {
            debug!(listener = %id, "Listener already subscribed");
            return;
        }
        self.publish_listener_count();
        debug!(listener = %id, total = self.registry.len(), "Listener subscribed");

        if self.state.is_open() {
            if let Some(filters) = filter {
                self.send_subscribe(filters);
            }
        } else if self.state == ConnectionState::Idle {
            self.start_connect("subscriber present");
        }
    }

    fn on_unsubscribe(&mut self, id: ListenerId) {
        if !self.registry.remove(id) {
            return;
        }
        self.publish_listener_count();
        debug!(listener = %id, remaining = self.registry.len(), "Listener unsubscribed");

        if self.registry.is_empty()
            && !matches!(
                self.state,
                ConnectionState::Idle | ConnectionState::ManuallyClosed
            )
        {
            let seq = self.sched_seq;
            debug!(
                debounce_ms = self.config.teardown_debounce,
                "Last listener left, scheduling debounced teardown"
            );
            self.spawn_timer_ms(self.config.teardown_debounce, TimerEvent::Teardown { seq });
        }
    }

    fn on_set_filter(&mut self, id: ListenerId, filters: Value) {
        if !self.registry.set_filter(id, filters.clone()) {
            return;
        }
        if self.state.is_open() {
            self.send_subscribe(filters);
        }
    }

    fn on_send(&mut self, payload: Value) {
        if self.state.is_open() {
            if let Some(out) = &self.link_out {
                let _ = out.send(payload.to_string());
                return;
            }
        }
        debug!("Send while disconnected, payload dropped");
    }

    // ---- transport events ----

    fn on_opened(&mut self, seq: u64, outbound: mpsc::UnboundedSender<String>) {
        if seq != self.conn_seq || self.state != ConnectionState::Connecting {
            // A stale open (superseded by disconnect/teardown): dropping
            // the sender closes the socket, keeping at most one
            // connection alive.
            debug!(seq, current = self.conn_seq, "Discarding stale transport open");
            return;
        }

        self.link_out = Some(outbound);
        self.opened_at = Some(Instant::now());
        self.set_state(ConnectionState::OpenUnstable);
        self.shared.stats.record_connected();
        info!(url = %self.config.url, "Stream connected");

        self.registry.notify_connect();

        self.spawn_timer_ms(self.config.settle_delay, TimerEvent::Settle { seq });
        self.spawn_timer_ms(self.config.stability_window, TimerEvent::Stability { seq });
        self.spawn_heartbeat(seq);
    }

    fn on_open_failed(&mut self, seq: u64, error: &Error) {
        if seq != self.conn_seq || self.state != ConnectionState::Connecting {
            return;
        }
        warn!(error = %error, "Stream connection attempt failed");
        self.last_attempt_ended_at = Some(Instant::now());
        self.registry.notify_disconnect();

        // Never opened: lifetime is zero, standard backoff branch.
        let class = classify_close(
            None,
            Duration::ZERO,
            Duration::from_millis(self.config.stability_window),
        );
        self.after_failure(class);
    }

    fn on_frame(&mut self, seq: u64, frame: Frame) {
        if seq != self.conn_seq {
            return;
        }
        match frame {
            Frame::Text(text) => self.on_text(&text),
            Frame::Closed { code } => self.on_close(code),
        }
    }

    fn on_text(&mut self, text: &str) {
        if !self.state.is_open() {
            return;
        }
        match Inbound::parse(text) {
            None => {
                self.shared.stats.record_malformed();
                debug!(len = text.len(), "Dropping malformed frame");
            }
            Some(Inbound::Control(value)) => {
                self.shared.stats.record_control();
                debug!(kind = value.get("type").and_then(|v| v.as_str()), "Control message");
            }
            Some(Inbound::Event(value)) => {
                self.shared.stats.record_event();
                self.shared.buffer.push(value.clone());
                self.registry.notify_event(&value);
            }
            Some(Inbound::Ignored(value)) => {
                debug!(?value, "Ignoring unrecognized message");
            }
        }
    }

    fn on_close(&mut self, code: Option<u16>) {
        if !self.state.is_open() {
            return;
        }
        self.set_state(ConnectionState::Closing);

        let lifetime = self.opened_at.map_or(Duration::ZERO, |t| t.elapsed());
        self.teardown_link();
        self.last_attempt_ended_at = Some(Instant::now());

        self.registry.notify_disconnect();

        let class = classify_close(
            code,
            lifetime,
            Duration::from_millis(self.config.stability_window),
        );
        info!(
            close_code = code,
            lifetime_ms = lifetime.as_millis() as u64,
            class = ?class,
            "Stream closed"
        );

        match class {
            FailureClass::Clean => {
                self.attempt = 0;
                self.failures.reset();
                self.set_state(ConnectionState::Idle);
            }
            class => self.after_failure(class),
        }
    }

    // ---- scheduled transitions ----

    fn on_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::Retry { seq } => {
                if seq != self.sched_seq || self.state != ConnectionState::BackoffWait {
                    return;
                }
                if self.registry.is_empty() {
                    debug!("Retry due but no listeners remain, going idle");
                    self.set_state(ConnectionState::Idle);
                    return;
                }
                self.start_connect("backoff elapsed");
            }
            TimerEvent::CircuitCooldown { seq } => {
                if seq != self.sched_seq || self.state != ConnectionState::CircuitOpen {
                    return;
                }
                let _ = self.breaker.try_pass();
                self.failures.reset();
                self.attempt = 0;
                self.set_state(ConnectionState::Idle);
                info!("Circuit breaker cooldown elapsed, retries permitted again");
                if !self.registry.is_empty() {
                    self.start_connect("circuit cooldown elapsed");
                }
            }
            TimerEvent::Teardown { seq } => {
                if seq != self.sched_seq || !self.registry.is_empty() {
                    return;
                }
                if matches!(
                    self.state,
                    ConnectionState::Idle | ConnectionState::ManuallyClosed
                ) {
                    return;
                }
                info!("No listeners remain, tearing stream down");
                self.sched_seq += 1;
                self.set_state(ConnectionState::Closing);
                self.teardown_link();
                self.attempt = 0;
                self.failures.reset();
                self.breaker.reset();
                self.set_state(ConnectionState::Idle);
            }
            TimerEvent::Stability { seq } => {
                if seq != self.conn_seq || self.state != ConnectionState::OpenUnstable {
                    return;
                }
                self.set_state(ConnectionState::OpenStable);
                self.attempt = 0;
                self.failures.record_stable_open();
                info!(
                    window_ms = self.config.stability_window,
                    "Connection stabilized, retry budget restored"
                );
            }
            TimerEvent::Settle { seq } => {
                if seq != self.conn_seq || !self.state.is_open() {
                    return;
                }
                for filters in self.registry.filters() {
                    self.send_subscribe(filters);
                }
            }
            TimerEvent::Heartbeat { seq } => {
                if seq != self.conn_seq || !self.state.is_open() {
                    return;
                }
                if let Some(out) = &self.link_out {
                    let _ = out.send(OutboundMessage::Ping.to_wire());
                    self.shared.stats.record_ping();
                }
            }
        }
    }

    // ---- state machine internals ----

    #[instrument(name = "stream_connect", skip(self), fields(url = %self.config.url))]
    fn start_connect(&mut self, reason: &str) {
        if self.state == ConnectionState::ManuallyClosed {
            return;
        }
        if self.breaker.is_open() {
            if !self.breaker.try_pass() {
                self.set_state(ConnectionState::CircuitOpen);
                return;
            }
            // Half-closed: one fresh attempt cycle.
            self.failures.reset();
            self.attempt = 0;
        }

        // Global minimum spacing between attempts, independent of the
        // backoff policy.
        if let Some(ended) = self.last_attempt_ended_at {
            let min = Duration::from_millis(self.config.min_reconnect_delay);
            let elapsed = ended.elapsed();
            if elapsed < min {
                let wait = min - elapsed;
                self.sched_seq += 1;
                let seq = self.sched_seq;
                debug!(
                    wait_ms = wait.as_millis() as u64,
                    "Too soon since last attempt, deferring connect"
                );
                self.set_state(ConnectionState::BackoffWait);
                self.spawn_timer(wait, TimerEvent::Retry { seq });
                return;
            }
        }

        self.conn_seq += 1;
        let seq = self.conn_seq;
        self.conn_cancel = self.cancel.child_token();
        self.set_state(ConnectionState::Connecting);
        if self.attempt > 0 {
            self.shared.stats.record_reconnect();
        }
        info!(reason, attempt = self.attempt, "Opening stream connection");

        let transport = Arc::clone(&self.transport);
        let url = self.config.url.clone();
        let tx = self.input_tx.clone();
        let timeout = Duration::from_millis(self.config.connect_timeout);

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, transport.open(&url)).await {
                Ok(Ok(Link {
                    outbound,
                    mut inbound,
                })) => {
                    // The open must enter the queue before any forwarded
                    // frame, so the forwarder starts only afterwards.
                    let _ = tx.send(Input::Opened { seq, outbound });
                    tokio::spawn(async move {
                        while let Some(frame) = inbound.recv().await {
                            if tx.send(Input::Frame { seq, frame }).is_err() {
                                break;
                            }
                        }
                    });
                }
                Ok(Err(error)) => {
                    let _ = tx.send(Input::OpenFailed { seq, error });
                }
                Err(_) => {
                    let _ = tx.send(Input::OpenFailed {
                        seq,
                        error: Error::timeout("stream connect timeout"),
                    });
                }
            }
        });
    }

    /// Books one more consecutive failure and decides what happens next:
    /// trip the circuit, or schedule a retry through the backoff policy.
    fn after_failure(&mut self, class: FailureClass) {
        let count = self.failures.record_failure();
        if count >= self.config.max_failures {
            self.open_circuit("failure threshold reached");
            return;
        }
        if self.attempt >= self.config.max_reconnect_attempts {
            self.open_circuit("retry budget exhausted");
            return;
        }

        let delay = self.config.backoff.delay(self.attempt, class.was_unstable());
        self.attempt += 1;
        self.sched_seq += 1;
        let seq = self.sched_seq;
        info!(
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            unstable = class.was_unstable(),
            "Scheduling reconnect"
        );
        self.set_state(ConnectionState::BackoffWait);
        self.spawn_timer(delay, TimerEvent::Retry { seq });
    }

    fn open_circuit(&mut self, reason: &str) {
        self.breaker.trip();
        self.sched_seq += 1;
        let seq = self.sched_seq;
        warn!(
            reason,
            cooldown_ms = self.config.circuit_breaker_timeout,
            "Suspending reconnection attempts"
        );
        self.set_state(ConnectionState::CircuitOpen);
        self.spawn_timer_ms(
            self.config.circuit_breaker_timeout,
            TimerEvent::CircuitCooldown { seq },
        );
    }

    fn enter_manual_close(&mut self, reason: &str) {
        if self.state == ConnectionState::ManuallyClosed {
            return;
        }
        let was_open = self.state.is_open();
        self.sched_seq += 1;
        self.teardown_link();
        self.attempt = 0;
        self.failures.reset();
        self.breaker.reset();
        self.set_state(ConnectionState::ManuallyClosed);
        if was_open {
            self.registry.notify_disconnect();
        }
        info!(reason, "Stream manually closed");
    }

    /// Drops the live link (the write pump finishes with a close frame)
    /// and invalidates all connection-scoped inputs and timers.
    fn teardown_link(&mut self) {
        self.conn_seq += 1;
        self.conn_cancel.cancel();
        self.link_out = None;
        self.opened_at = None;
    }

    fn send_subscribe(&self, filters: Value) {
        if let Some(out) = &self.link_out {
            let msg = OutboundMessage::Subscribe { filters };
            let _ = out.send(msg.to_wire());
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Connection state transition");
        }
        self.state = next;
        self.shared.state.store(next.as_u8(), Ordering::Release);
    }

    fn publish_listener_count(&self) {
        self.shared
            .listener_count
            .store(self.registry.len(), Ordering::Release);
    }

    fn spawn_timer_ms(&self, delay_ms: u64, event: TimerEvent) {
        self.spawn_timer(Duration::from_millis(delay_ms), event);
    }

    fn spawn_timer(&self, delay: Duration, event: TimerEvent) {
        let tx = self.input_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = sleep(delay) => {
                    let _ = tx.send(Input::Timer(event));
                }
            }
        });
    }

    fn spawn_heartbeat(&self, seq: u64) {
        let tx = self.input_tx.clone();
        let cancel = self.conn_cancel.clone();
        let period = Duration::from_millis(self.config.heartbeat_interval);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            // The first tick completes immediately; the probe cadence
            // starts one full period after open.
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if tx.send(Input::Timer(TimerEvent::Heartbeat { seq })).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }
}
