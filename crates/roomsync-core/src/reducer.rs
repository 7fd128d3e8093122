//! The reducer seam between the hub and the application.
//!
//! A reducer derives a sparse state patch from the current state and an
//! inbound event. The hub treats it as an opaque capability: it supplies
//! the default state for fresh rooms and decides how each event mutates
//! the room.

use roomsync_protocol::Event;
use serde_json::Value;
use thiserror::Error;

/// A reducer failure, reported back to the originating session only.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ReduceError(String);

impl ReduceError {
    /// Create a new reducer error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Application-supplied state reduction.
///
/// `reduce` must be pure: no side effects, same patch for the same inputs.
/// Returning `Ok(None)` marks the event unrecognized; the hub logs it and
/// neither persists nor broadcasts. The returned patch must be structurally
/// compatible with the state — the pipeline merges it without validation.
pub trait Reducer: Send + Sync {
    /// The default state for a room with nothing persisted.
    fn initial_state(&self) -> Value;

    /// Derive a patch from the current state and an event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be applied; the hub reports it
    /// to the originating session and leaves the state untouched.
    fn reduce(&self, state: &Value, event: &Event) -> Result<Option<Value>, ReduceError>;
}
