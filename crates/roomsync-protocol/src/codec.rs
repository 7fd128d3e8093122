//! Codec for roomsync text frames.
//!
//! Inbound frames are decoded into [`ClientMessage`]; outbound frames are
//! encoded from [`ServerMessage`]. Everything on the wire is JSON text
//! except the literal keep-alive string.

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::frames::{ClientMessage, Event, ServerMessage, KEEPALIVE};

/// Protocol errors that can occur while decoding or encoding frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame decoded to something other than a JSON object.
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// Frame carries neither a `name` nor an `event` tag.
    #[error("missing event tag")]
    MissingEventTag,
}

/// Decode an inbound text frame.
///
/// # Errors
///
/// Returns an error if the frame is not the keep-alive literal and cannot be
/// decoded into an [`Event`].
pub fn decode_client(text: &str) -> Result<ClientMessage, ProtocolError> {
    if text == KEEPALIVE {
        return Ok(ClientMessage::KeepAlive);
    }

    let value: Value = serde_json::from_str(text)?;
    event_from_value(value).map(ClientMessage::Event)
}

/// Decode an already-parsed JSON value into an [`Event`].
///
/// # Errors
///
/// Returns an error if the value is not an object or carries no event tag.
pub fn event_from_value(value: Value) -> Result<Event, ProtocolError> {
    let fields = match value {
        Value::Object(fields) => fields,
        other => return Err(ProtocolError::NotAnObject(value_kind(&other))),
    };

    if let Some(name) = fields.get("name").and_then(Value::as_str) {
        let name = name.to_owned();
        let mut payload = fields;
        payload.remove("name");
        return Ok(Event::new(name, Value::Object(payload)));
    }

    // Legacy schema: {"event": <tag>, "payload": ...}
    if let Some(name) = fields.get("event").and_then(Value::as_str) {
        let payload = fields
            .get("payload")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        return Ok(Event::new(name.to_owned(), payload));
    }

    Err(ProtocolError::MissingEventTag)
}

/// Encode an outbound message as a text frame.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn encode_server(message: &ServerMessage) -> Result<String, ProtocolError> {
    let text = match message {
        ServerMessage::Patch(value) => serde_json::to_string(value)?,
        ServerMessage::Error { message } => serde_json::to_string(&json!({ "error": message }))?,
    };
    Ok(text)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
