//! Shared test fixtures: an in-memory transport the reconnect tests drive.

use async_trait::async_trait;
use eventlink::error::{Error, Result};
use eventlink::stream::{Frame, Link, StreamConfig, Transport};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::time::Duration;

/// The server side of one accepted mock connection.
pub struct ServerEnd {
    /// Text frames the client sent (subscribe payloads, pings, data).
    pub from_client: mpsc::UnboundedReceiver<String>,
    /// Sends frames to the client.
    pub to_client: mpsc::UnboundedSender<Frame>,
}

impl ServerEnd {
    /// Delivers a JSON message to the client.
    pub fn send_json(&self, value: Value) {
        let _ = self.to_client.send(Frame::Text(value.to_string()));
    }

    /// Delivers a raw text frame to the client.
    pub fn send_text(&self, text: &str) {
        let _ = self.to_client.send(Frame::Text(text.to_string()));
    }

    /// Closes the connection with the given close code.
    pub fn close(&self, code: Option<u16>) {
        let _ = self.to_client.send(Frame::Closed { code });
    }

    /// Receives the next client frame as JSON.
    pub async fn recv_json(&mut self) -> Value {
        let text = self
            .from_client
            .recv()
            .await
            .expect("client closed the connection");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }
}

/// In-memory transport. Every `open` consumes one scripted outcome
/// (accept unless a refusal was queued); accepted connections hand their
/// server end back to the test.
pub struct MockTransport {
    refusals: Mutex<VecDeque<()>>,
    accepted_tx: mpsc::UnboundedSender<ServerEnd>,
}

/// Builds a mock transport plus the queue of accepted server ends.
pub fn mock_transport() -> (MockTransport, mpsc::UnboundedReceiver<ServerEnd>) {
    let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
    (
        MockTransport {
            refusals: Mutex::new(VecDeque::new()),
            accepted_tx,
        },
        accepted_rx,
    )
}

impl MockTransport {
    /// Queues `n` connection refusals ahead of any further accepts.
    pub fn refuse_next(&self, n: usize) {
        let mut refusals = self.refusals.lock().unwrap();
        for _ in 0..n {
            refusals.push_back(());
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _url: &str) -> Result<Link> {
        if self.refusals.lock().unwrap().pop_front().is_some() {
            return Err(Error::network("mock: connection refused"));
        }
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let _ = self.accepted_tx.send(ServerEnd {
            from_client: out_rx,
            to_client: in_tx,
        });
        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Config pointing at the mock endpoint.
pub fn test_config() -> StreamConfig {
    StreamConfig::new("ws://mock.test/ws/events")
}

/// Spin-waits (in 1 ms paused-clock steps) until the predicate holds.
pub async fn wait_until(mut predicate: impl FnMut() -> bool) {
    for _ in 0..60_000 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached within 60 seconds of simulated time");
}
