//! Message types for the roomsync wire protocol.
//!
//! Every frame is a UTF-8 text frame. Inbound frames are either the literal
//! keep-alive string or a JSON event object; outbound frames are JSON
//! patches or error payloads.

use serde::Serialize;
use serde_json::Value;

/// Keep-alive payload sent by clients; never forwarded to a hub.
pub const KEEPALIVE: &str = "ping";

/// Close code used when a quit-flagged session keeps sending.
pub const CLOSE_BROKEN_CODE: u16 = 1011;

/// Close reason used when a quit-flagged session keeps sending.
pub const CLOSE_BROKEN_REASON: &str = "WebSocket broken.";

/// A client-originated mutation request.
///
/// Two wire schemas decode into this: `{"name": <tag>, ...fields}` where the
/// remaining fields become the payload, and the legacy
/// `{"event": <tag>, "payload": ...}` form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Event discriminant, e.g. `increase`.
    pub name: String,
    /// Application-defined payload; an empty object when the wire frame
    /// carried no extra fields.
    pub payload: Value,
}

impl Event {
    /// Create a new event.
    #[must_use]
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Look up a payload field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }
}

/// A decoded inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// The literal `ping` keep-alive.
    KeepAlive,
    /// A mutation request.
    Event(Event),
}

/// An outbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// A sparse state patch, broadcast to every live session. A full state
    /// object is a valid patch and uses the same encoding.
    Patch(Value),
    /// An error payload, sent only to the offending session.
    Error {
        /// Human-readable diagnostic.
        message: String,
    },
}

impl ServerMessage {
    /// Create a patch message.
    #[must_use]
    pub fn patch(value: Value) -> Self {
        ServerMessage::Patch(value)
    }

    /// Create an error message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_field_lookup() {
        let event = Event::new("decrease", json!({"amount": 4}));
        assert_eq!(event.field("amount"), Some(&json!(4)));
        assert_eq!(event.field("missing"), None);
    }

    #[test]
    fn test_event_serializes_with_payload() {
        let event = Event::new("increase", json!({"amount": 2}));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"name": "increase", "payload": {"amount": 2}}));
    }
}
