//! Bounded most-recent-first event buffer.

use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

/// Fixed-capacity, most-recent-first sequence of received domain events.
///
/// Shared between the connection actor (sole writer) and any number of
/// consumers (readers). Newest events sit at the front; once capacity is
/// exceeded the oldest element is dropped. Consumers only ever get
/// snapshots — nothing hands out a mutable view.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    inner: Arc<RwLock<VecDeque<Value>>>,
    capacity: usize,
}

impl EventBuffer {
    /// Creates an empty buffer with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
        }
    }

    /// Appends an event at the front, evicting the oldest entry when the
    /// buffer is full.
    pub(crate) fn push(&self, event: Value) {
        let mut guard = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.push_front(event);
        while guard.len() > self.capacity {
            guard.pop_back();
        }
    }

    /// Returns a snapshot of the current contents, newest first.
    pub fn snapshot(&self) -> Vec<Value> {
        let guard = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.iter().cloned().collect()
    }

    /// Empties the buffer. Does not affect the connection.
    pub fn clear(&self) {
        let mut guard = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.clear();
    }

    /// Number of buffered events.
    pub fn len(&self) -> usize {
        let guard = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
