//! Transport abstraction and the WebSocket implementation.
//!
//! The connection actor talks to the wire through the [`Transport`] trait:
//! `open` yields a [`Link`] — an outbound text sender plus an inbound
//! [`Frame`] receiver. The production implementation splits a
//! `tokio-tungstenite` stream into read/write pump tasks bridging to those
//! channels. Tests substitute an in-memory transport.
//!
//! Consumers never see this layer; the raw connection is owned exclusively
//! by the connection manager.

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, warn};

/// One inbound transport event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text payload.
    Text(String),
    /// The connection closed; carries the close code when the peer sent
    /// one, `None` for abrupt transport failures.
    Closed {
        /// Protocol close code, if any.
        code: Option<u16>,
    },
}

/// A live duplex connection.
///
/// Dropping `outbound` closes the write side, which sends a close frame
/// and lets the peer finish the handshake. `inbound` yields exactly one
/// [`Frame::Closed`] as its final frame.
#[derive(Debug)]
pub struct Link {
    /// Outbound text frames to the server.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Inbound frames from the server.
    pub inbound: mpsc::UnboundedReceiver<Frame>,
}

/// The seam between the connection manager and the wire.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opens a connection to `url`.
    async fn open(&self, url: &str) -> Result<Link>;
}

/// Production WebSocket transport over `tokio-tungstenite`.
#[derive(Debug, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str) -> Result<Link> {
        let (ws_stream, response) = connect_async(url)
            .await
            .map_err(|e| Error::network(format!("WebSocket connection failed: {e}")))?;
        debug!(status = response.status().as_u16(), "WebSocket connection established");

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Frame>();

        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    warn!(error = %e, "Failed to write frame");
                    break;
                }
            }
            // Sender dropped or write failed: finish with a close frame.
            let _ = write.send(Message::Close(None)).await;
        });

        tokio::spawn(async move {
            let mut close_code: Option<u16> = None;
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(Frame::Text(text.to_string())).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Binary(data)) => {
                        if let Ok(text) = String::from_utf8(data.to_vec()) {
                            if in_tx.send(Frame::Text(text)).is_err() {
                                return;
                            }
                        }
                    }
                    Ok(Message::Close(close_frame)) => {
                        close_code = close_frame.map(|f| u16::from(f.code));
                        break;
                    }
                    // Ping/pong are answered by tungstenite itself.
                    Ok(_) => {}
                    Err(e) => {
                        debug!(error = %e, "WebSocket read error");
                        break;
                    }
                }
            }
            let _ = in_tx.send(Frame::Closed { code: close_code });
        });

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_equality() {
        assert_eq!(
            Frame::Closed { code: Some(1000) },
            Frame::Closed { code: Some(1000) }
        );
        assert_ne!(Frame::Text("a".into()), Frame::Text("b".into()));
    }

    #[tokio::test]
    async fn test_ws_transport_rejects_unreachable_endpoint() {
        let result = WsTransport.open("ws://127.0.0.1:1/ws").await;
        assert!(matches!(result, Err(Error::Network(_))));
    }
}
