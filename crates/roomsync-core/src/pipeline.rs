//! The serialized apply-persist sequence for one hub instance.
//!
//! The pipeline owns the in-memory state cache and the store binding. It
//! hydrates state on first use (persisted value, else the reducer's
//! default), applies events through the reducer, deep-merges the resulting
//! patch, and persists the merged state. Broadcasting the patch is the
//! hub's job; the pipeline hands it back.
//!
//! Store operations are bounded by a timeout so an unresponsive backend
//! degrades into a reported write failure instead of wedging the room.

use std::sync::Arc;
use std::time::Duration;

use roomsync_protocol::Event;
use roomsync_store::{Store, StoreError, EVENT_KEY, STATE_KEY};
use serde_json::Value;
use tracing::{debug, warn};

use crate::merge::deep_merge;
use crate::reducer::{ReduceError, Reducer};

/// Outcome of applying one event.
#[derive(Debug)]
pub enum ApplyOutcome {
    /// The reducer produced a patch; it has been merged and persisted.
    Applied {
        /// The sparse patch to broadcast (not the full state).
        patch: Value,
        /// Set when persisting the merged state failed; the in-memory
        /// state is kept and the broadcast proceeds regardless.
        persist_error: Option<StoreError>,
    },
    /// The reducer did not recognize the event; nothing changed.
    Ignored,
}

/// The apply-persist pipeline for one room.
pub struct Pipeline {
    room: String,
    reducer: Arc<dyn Reducer>,
    store: Arc<dyn Store>,
    op_timeout: Duration,
    state: Option<Value>,
}

impl Pipeline {
    /// Create a pipeline for `room`.
    #[must_use]
    pub fn new(
        room: impl Into<String>,
        reducer: Arc<dyn Reducer>,
        store: Arc<dyn Store>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            room: room.into(),
            reducer,
            store,
            op_timeout,
            state: None,
        }
    }

    /// Current state, hydrating it on first use.
    pub async fn state(&mut self) -> Value {
        self.hydrate().await.clone()
    }

    /// Apply one event: hydrate, reduce, merge, persist.
    ///
    /// # Errors
    ///
    /// Returns the reducer's error verbatim; store failures are captured in
    /// the outcome instead, because they must not abort the broadcast.
    pub async fn apply(&mut self, event: &Event) -> Result<ApplyOutcome, ReduceError> {
        self.hydrate().await;
        // Hydrate always leaves a cached state behind.
        let state = self.state.as_mut().expect("state hydrated");

        let Some(patch) = self.reducer.reduce(state, event)? else {
            return Ok(ApplyOutcome::Ignored);
        };

        deep_merge(state, &patch);
        debug!(room = %self.room, event = %event.name, "Applied event");

        let merged = state.clone();
        let persist_error = match self.put(STATE_KEY, &merged).await {
            Ok(()) => None,
            Err(err) => {
                warn!(room = %self.room, error = %err, "Failed to persist state");
                Some(err)
            }
        };

        Ok(ApplyOutcome::Applied {
            patch,
            persist_error,
        })
    }

    /// Persist the raw event under the diagnostic key. Best-effort.
    pub async fn record_event(&self, event: &Event) {
        let raw = match serde_json::to_value(event) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(room = %self.room, error = %err, "Failed to serialize event");
                return;
            }
        };
        if let Err(err) = self.put(EVENT_KEY, &raw).await {
            warn!(room = %self.room, error = %err, "Failed to record event");
        }
    }

    async fn hydrate(&mut self) -> &Value {
        if self.state.is_none() {
            let loaded = match self.get(STATE_KEY).await {
                Ok(Some(value)) => Some(value),
                Ok(None) => None,
                Err(err) => {
                    // Availability over strict durability: an unreadable
                    // store hydrates like an empty one.
                    warn!(room = %self.room, error = %err, "State read failed, using default");
                    None
                }
            };

            let state = match loaded {
                Some(state) => state,
                None => {
                    let default = self.reducer.initial_state();
                    if let Err(err) = self.put(STATE_KEY, &default).await {
                        warn!(room = %self.room, error = %err, "Failed to persist default state");
                    }
                    default
                }
            };

            debug!(room = %self.room, "State hydrated");
            self.state = Some(state);
        }

        self.state.as_ref().expect("state hydrated")
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        match tokio::time::timeout(self.op_timeout, self.store.get(&self.room, key)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        match tokio::time::timeout(self.op_timeout, self.store.put(&self.room, key, value)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }
}
