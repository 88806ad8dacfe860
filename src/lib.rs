//! Eventlink
//!
//! A resilient real-time event-stream client: one persistent duplex
//! connection shared by many independent in-process consumers, with
//! failure classification, backoff and circuit-breaker pacing, heartbeat
//! keepalive, and bounded most-recent-first event fan-out.
//!
//! # Features
//!
//! - **Single shared connection**: at most one physical connection per
//!   client, no matter how many subscribers come and go
//! - **Failure classification**: clean closures, transient drops, and
//!   structurally broken endpoints each get the retry treatment they
//!   deserve
//! - **Pacing**: exponential backoff with a hard 10 s floor, plus a
//!   circuit breaker that absorbs failure bursts instead of hammering a
//!   dead endpoint
//! - **Async/Await**: built on tokio; every state transition is a single
//!   serialized event
//!
//! # Example
//!
//! ```rust,no_run
//! use eventlink::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let client = EventStreamClient::new(StreamConfig::new("ws://localhost:8000/ws/events"))?;
//!
//! let listener = Listener::new()
//!     .on_event(|event| println!("event: {event}"))
//!     .with_filter(serde_json::json!({"severity": "high"}));
//! let id = listener.id();
//! client.subscribe(listener);
//!
//! // ... the dashboard renders client.events() ...
//!
//! client.unsubscribe(id);
//! client.shutdown();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Global suppressions: these lints apply broadly across the codebase and
// would require excessive local annotations.
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::unreadable_literal)]

// Re-exports of external dependencies
pub use serde;
pub use serde_json;

pub mod circuit_breaker;
pub mod error;
pub mod logging;
pub mod stream;

pub use circuit_breaker::CircuitBreaker;
pub use error::{Error, Result};
pub use stream::{
    BackoffPolicy, ConnectionState, EventBuffer, EventStreamClient, Listener, ListenerId,
    StreamConfig, StreamStatsSnapshot,
};
// Re-export CancellationToken for convenient access
pub use tokio_util::sync::CancellationToken;

/// Prelude module for convenient imports
///
/// Import everything you need with:
/// ```rust
/// use eventlink::prelude::*;
/// ```
pub mod prelude {
    pub use crate::circuit_breaker::CircuitBreaker;
    pub use crate::error::{Error, Result};
    pub use crate::logging::{LogConfig, LogFormat, LogLevel, init_logging, try_init_logging};
    pub use crate::stream::{
        BackoffPolicy, ConnectionState, EventBuffer, EventStreamClient, FailureClass, Listener,
        ListenerId, StreamConfig, StreamStatsSnapshot, Transport, WsTransport,
    };
    pub use serde::{Deserialize, Serialize};
    pub use tokio_util::sync::CancellationToken;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
