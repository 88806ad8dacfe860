//! Inbound frame classification.
//!
//! Everything the server sends is JSON. Control messages keep the session
//! alive and acknowledge subscriptions; they are consumed internally and
//! never reach the event buffer or consumer callbacks. Domain events are
//! identified by an `event_id` or `event_type` field. Anything else —
//! including frames that fail to parse — is dropped.

use serde_json::Value;

/// Inbound `type` values consumed internally.
const CONTROL_TYPES: [&str; 6] = ["ping", "pong", "keepalive", "ack", "connected", "subscribed"];

/// Classification of one parsed inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Protocol-internal control message; consumed silently.
    Control(Value),
    /// A domain event to buffer and fan out.
    Event(Value),
    /// Parsed JSON that is neither control nor a recognizable event.
    Ignored(Value),
}

impl Inbound {
    /// Classifies a parsed JSON value.
    pub fn classify(value: Value) -> Self {
        if value
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| CONTROL_TYPES.contains(&t))
        {
            return Self::Control(value);
        }
        if value.get("event_id").is_some() || value.get("event_type").is_some() {
            return Self::Event(value);
        }
        Self::Ignored(value)
    }

    /// Parses and classifies a raw text frame. `None` for malformed JSON.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str::<Value>(text).ok().map(Self::classify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_control_types_are_consumed() {
        for t in ["ping", "pong", "keepalive", "ack", "connected", "subscribed"] {
            let inbound = Inbound::classify(json!({"type": t}));
            assert!(matches!(inbound, Inbound::Control(_)), "{t} must be control");
        }
    }

    #[test]
    fn test_domain_events_by_id_or_type() {
        assert!(matches!(
            Inbound::classify(json!({"event_id": "e-1", "payload": 1})),
            Inbound::Event(_)
        ));
        assert!(matches!(
            Inbound::classify(json!({"event_type": "login_failure"})),
            Inbound::Event(_)
        ));
        // An event_type field wins over an unknown type tag.
        assert!(matches!(
            Inbound::classify(json!({"type": "notification", "event_type": "alert"})),
            Inbound::Event(_)
        ));
    }

    #[test]
    fn test_unrecognized_json_is_ignored() {
        assert!(matches!(
            Inbound::classify(json!({"hello": "world"})),
            Inbound::Ignored(_)
        ));
        assert!(matches!(Inbound::classify(json!(42)), Inbound::Ignored(_)));
    }

    #[test]
    fn test_malformed_text_is_dropped() {
        assert_eq!(Inbound::parse("{not json"), None);
        assert!(Inbound::parse(r#"{"event_id": 7}"#).is_some());
    }
}
