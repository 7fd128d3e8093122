//! Session tracking for a hub instance.
//!
//! A session is one live bidirectional channel to a client plus a quit
//! flag. The registry owns every session for its lifetime: added on
//! upgrade, flagged quit on send failure or transport close, removed
//! lazily at the next broadcast pass or eagerly on close notification.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Atomic counter backing [`SessionId::next`].
static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A unique identifier for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate the next process-unique session ID.
    #[must_use]
    pub fn next() -> Self {
        Self(ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess_{}", self.0)
    }
}

/// Session delivery errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The peer is gone; nothing more can be delivered.
    #[error("session channel closed")]
    Closed,
}

/// The outbound half of one client connection.
///
/// The transport layer supplies the implementation; the hub only ever
/// sends text frames and, for broken sessions, a close.
#[async_trait]
pub trait SessionSink: Send {
    /// Deliver a text frame to the client.
    async fn send_text(&mut self, text: &str) -> Result<(), SessionError>;

    /// Close the connection with a protocol-level code and reason.
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), SessionError>;
}

pub(crate) struct Session {
    pub(crate) id: SessionId,
    pub(crate) sink: Box<dyn SessionSink>,
    pub(crate) quit: bool,
}

/// The set of live sessions for one hub instance, in insertion order.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Vec<Session>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked sessions, quit-flagged ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check whether no sessions are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Append a session. Identity-based; no deduplication.
    pub fn add(&mut self, id: SessionId, sink: Box<dyn SessionSink>) {
        self.sessions.push(Session {
            id,
            sink,
            quit: false,
        });
        debug!(session = %id, total = self.sessions.len(), "Session added");
    }

    /// Flag a session as quit without removing it.
    ///
    /// Returns `true` if the session is tracked.
    pub fn mark_quit(&mut self, id: SessionId) -> bool {
        match self.sessions.iter_mut().find(|s| s.id == id) {
            Some(session) => {
                session.quit = true;
                true
            }
            None => false,
        }
    }

    /// Check whether a tracked session is quit-flagged.
    #[must_use]
    pub fn is_quit(&self, id: SessionId) -> bool {
        self.sessions
            .iter()
            .find(|s| s.id == id)
            .is_some_and(|s| s.quit)
    }

    /// Drop every quit-flagged session, preserving insertion order.
    ///
    /// Returns the number of sessions removed.
    pub fn remove_quit(&mut self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|s| !s.quit);
        let removed = before - self.sessions.len();
        if removed > 0 {
            debug!(
                removed,
                total = self.sessions.len(),
                "Removed quit sessions"
            );
        }
        removed
    }

    /// Deliver a text frame to a single session.
    ///
    /// A delivery failure flags the session quit; removal happens at the
    /// next compaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is unknown or delivery fails.
    pub async fn send_to(&mut self, id: SessionId, text: &str) -> Result<(), SessionError> {
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(SessionError::Closed)?;

        if let Err(err) = session.sink.send_text(text).await {
            session.quit = true;
            return Err(err);
        }
        Ok(())
    }

    /// Close a session with a protocol-level code, flagging it quit.
    pub async fn close_session(&mut self, id: SessionId, code: u16, reason: &str) {
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == id) {
            session.quit = true;
            // Best-effort: the peer may already be gone.
            let _ = session.sink.close(code, reason).await;
        }
    }

    pub(crate) fn sessions_mut(&mut self) -> &mut [Session] {
        &mut self.sessions
    }
}
