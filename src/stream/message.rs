//! Outbound wire messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Control messages the client sends to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundMessage {
    /// Subscribe with a filter payload. Sent once per (re)connection,
    /// after the post-open settle delay, and once per filter change.
    Subscribe {
        /// Server-side filter criteria.
        filters: Value,
    },
    /// Liveness probe, sent on the heartbeat interval.
    Ping,
}

impl OutboundMessage {
    /// Serializes the message to its wire form.
    pub fn to_wire(&self) -> String {
        // Infallible for these variants.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscribe_wire_format() {
        let msg = OutboundMessage::Subscribe {
            filters: json!({"severity": "high"}),
        };
        let wire: Value = serde_json::from_str(&msg.to_wire()).unwrap();
        assert_eq!(wire, json!({"type": "subscribe", "filters": {"severity": "high"}}));
    }

    #[test]
    fn test_ping_wire_format() {
        let wire: Value = serde_json::from_str(&OutboundMessage::Ping.to_wire()).unwrap();
        assert_eq!(wire, json!({"type": "ping"}));
    }
}
