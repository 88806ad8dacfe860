//! Listener registry and synchronous fan-out.

use serde_json::Value;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Callback invoked when the shared connection opens.
pub type ConnectCallback = Arc<dyn Fn() + Send + Sync>;
/// Callback invoked when the shared connection closes or fails.
pub type DisconnectCallback = Arc<dyn Fn() + Send + Sync>;
/// Callback invoked for each received domain event.
pub type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique listener identity.
///
/// Subscription idempotence is keyed on this identity, not on callback
/// values: subscribing the same `Listener` twice is a no-op, while two
/// separately constructed listeners with identical callbacks are distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// A consumer subscription: an identity, up to three optional callbacks,
/// and an optional filter payload sent to the server after (re)connect.
///
/// The consumer owns the listener's lifetime through explicit
/// `subscribe`/`unsubscribe` calls. A listener that is never unsubscribed
/// keeps the shared connection alive — a resource leak, not a correctness
/// bug.
#[derive(Clone)]
pub struct Listener {
    id: ListenerId,
    pub(crate) on_connect: Option<ConnectCallback>,
    pub(crate) on_disconnect: Option<DisconnectCallback>,
    pub(crate) on_event: Option<EventCallback>,
    pub(crate) filter: Option<Value>,
}

impl Listener {
    /// Creates a listener with no callbacks and no filter.
    pub fn new() -> Self {
        Self {
            id: ListenerId::next(),
            on_connect: None,
            on_disconnect: None,
            on_event: None,
            filter: None,
        }
    }

    /// Returns this listener's identity.
    #[inline]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Sets the connect callback.
    #[must_use]
    pub fn on_connect(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(callback));
        self
    }

    /// Sets the disconnect callback.
    #[must_use]
    pub fn on_disconnect(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(callback));
        self
    }

    /// Sets the event callback.
    #[must_use]
    pub fn on_event(mut self, callback: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Arc::new(callback));
        self
    }

    /// Sets the filter payload sent to the server after connect.
    #[must_use]
    pub fn with_filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("has_on_connect", &self.on_connect.is_some())
            .field("has_on_disconnect", &self.on_disconnect.is_some())
            .field("has_on_event", &self.on_event.is_some())
            .field("filter", &self.filter)
            .finish()
    }
}

/// The set of active subscribers, in registration order.
///
/// Fan-out is synchronous and order-preserving. Each callback runs under
/// `catch_unwind`, so one panicking listener cannot block delivery to the
/// listeners registered after it.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: Vec<Listener>,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener. Returns `false` (no-op) when the identity is
    /// already registered.
    pub fn insert(&mut self, listener: Listener) -> bool {
        if self.contains(listener.id) {
            return false;
        }
        self.listeners.push(listener);
        true
    }

    /// Removes a listener by identity. Returns `true` if it was present.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    /// Whether the identity is registered.
    pub fn contains(&self, id: ListenerId) -> bool {
        self.listeners.iter().any(|l| l.id == id)
    }

    /// Replaces the stored filter for the given listener. Returns `true`
    /// if the listener was found.
    pub fn set_filter(&mut self, id: ListenerId, filter: Value) -> bool {
        match self.listeners.iter_mut().find(|l| l.id == id) {
            Some(listener) => {
                listener.filter = Some(filter);
                true
            }
            None => false,
        }
    }

    /// Filter payloads of all registered listeners, in registration order.
    pub fn filters(&self) -> Vec<Value> {
        self.listeners
            .iter()
            .filter_map(|l| l.filter.clone())
            .collect()
    }

    /// Number of registered listeners.
    #[inline]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether the registry is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Notifies every listener's `on_connect`, in registration order.
    pub fn notify_connect(&self) {
        for listener in &self.listeners {
            if let Some(cb) = &listener.on_connect {
                Self::guarded(listener.id, "on_connect", || cb());
            }
        }
    }

    /// Notifies every listener's `on_disconnect`, in registration order.
    pub fn notify_disconnect(&self) {
        for listener in &self.listeners {
            if let Some(cb) = &listener.on_disconnect {
                Self::guarded(listener.id, "on_disconnect", || cb());
            }
        }
    }

    /// Delivers one domain event to every listener's `on_event`, in
    /// registration order.
    pub fn notify_event(&self, event: &Value) {
        for listener in &self.listeners {
            if let Some(cb) = &listener.on_event {
                Self::guarded(listener.id, "on_event", || cb(event));
            }
        }
    }

    fn guarded(id: ListenerId, which: &str, call: impl FnOnce()) {
        invoke_guarded(id, which, call);
    }
}

/// Runs one listener callback under `catch_unwind`, logging a panic
/// instead of propagating it.
pub(crate) fn invoke_guarded(id: ListenerId, which: &str, call: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(call)).is_err() {
        warn!(listener = %id, callback = which, "Listener callback panicked");
    }
}
