//! The per-room hub actor.
//!
//! One actor owns one room: its state cache, its session registry, and its
//! store binding. Every command flows through the actor's mailbox, so
//! command handling for one room never interleaves — the single-writer
//! discipline is structural, not a scheduling accident. Different rooms
//! run on independent tasks and never share mutable state.
//!
//! No error terminates the actor. Bad input and storage failures are
//! reported to the offending session; dead sessions are flagged and
//! compacted without disturbing the rest.

use std::sync::Arc;
use std::time::Duration;

use roomsync_protocol::{codec, ClientMessage, ServerMessage};
use roomsync_protocol::{CLOSE_BROKEN_CODE, CLOSE_BROKEN_REASON};
use roomsync_store::Store;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};

use crate::broadcast::broadcast;
use crate::pipeline::{ApplyOutcome, Pipeline};
use crate::reducer::Reducer;
use crate::session::{SessionId, SessionRegistry, SessionSink};

/// Hub actor configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Mailbox capacity; senders back-pressure when full.
    pub mailbox_capacity: usize,
    /// Upper bound on each store operation.
    pub store_op_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
            store_op_timeout: Duration::from_secs(5),
        }
    }
}

/// Errors surfaced to callers of a [`HubHandle`].
#[derive(Debug, Error)]
pub enum HubError {
    /// The actor's mailbox is gone; the hub no longer exists.
    #[error("hub for room {0} is gone")]
    Gone(String),
}

enum HubCommand {
    Attach {
        id: SessionId,
        sink: Box<dyn SessionSink>,
    },
    Inbound {
        id: SessionId,
        text: String,
    },
    Closed {
        id: SessionId,
    },
    Snapshot {
        reply: oneshot::Sender<Value>,
    },
}

/// A clonable handle to one room's hub actor.
#[derive(Clone)]
pub struct HubHandle {
    room: String,
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// The room key this hub serves.
    #[must_use]
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Register a connection, returning its session ID.
    ///
    /// The hub sends the new session a full-state snapshot frame before any
    /// subsequent broadcast, so late joiners converge.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub is gone.
    pub async fn attach(&self, sink: Box<dyn SessionSink>) -> Result<SessionId, HubError> {
        let id = SessionId::next();
        self.send(HubCommand::Attach { id, sink }).await?;
        Ok(id)
    }

    /// Feed one inbound text frame from a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub is gone.
    pub async fn inbound(&self, id: SessionId, text: String) -> Result<(), HubError> {
        self.send(HubCommand::Inbound { id, text }).await
    }

    /// Notify the hub that a session's transport closed or errored.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub is gone.
    pub async fn closed(&self, id: SessionId) -> Result<(), HubError> {
        self.send(HubCommand::Closed { id }).await
    }

    /// Fetch the full current state, hydrating the room if needed.
    ///
    /// Used by plain (non-upgraded) requests; does not register a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub is gone.
    pub async fn snapshot(&self) -> Result<Value, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| HubError::Gone(self.room.clone()))
    }

    async fn send(&self, command: HubCommand) -> Result<(), HubError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| HubError::Gone(self.room.clone()))
    }
}

/// The per-room actor owning state and sessions.
pub struct HubActor {
    room: String,
    registry: SessionRegistry,
    pipeline: Pipeline,
    rx: mpsc::Receiver<HubCommand>,
}

impl HubActor {
    /// Spawn a hub actor for `room` on its own task.
    #[must_use]
    pub fn spawn(
        room: impl Into<String>,
        reducer: Arc<dyn Reducer>,
        store: Arc<dyn Store>,
        config: HubConfig,
    ) -> HubHandle {
        let room = room.into();
        let (tx, rx) = mpsc::channel(config.mailbox_capacity);

        let actor = Self {
            pipeline: Pipeline::new(room.clone(), reducer, store, config.store_op_timeout),
            registry: SessionRegistry::new(),
            room: room.clone(),
            rx,
        };
        tokio::spawn(actor.run());

        HubHandle { room, tx }
    }

    async fn run(mut self) {
        debug!(room = %self.room, "Hub actor started");

        while let Some(command) = self.rx.recv().await {
            match command {
                HubCommand::Attach { id, sink } => self.handle_attach(id, sink).await,
                HubCommand::Inbound { id, text } => self.handle_inbound(id, &text).await,
                HubCommand::Closed { id } => self.handle_closed(id),
                HubCommand::Snapshot { reply } => {
                    let _ = reply.send(self.pipeline.state().await);
                }
            }
        }

        debug!(room = %self.room, "Hub actor stopped");
    }

    async fn handle_attach(&mut self, id: SessionId, sink: Box<dyn SessionSink>) {
        self.registry.add(id, sink);

        // Late joiners get the full state up front; every later diff then
        // lands on a converged view.
        let state = self.pipeline.state().await;
        match codec::encode_server(&ServerMessage::patch(state)) {
            Ok(encoded) => {
                if self.registry.send_to(id, &encoded).await.is_err() {
                    warn!(room = %self.room, session = %id, "Snapshot delivery failed");
                }
            }
            Err(err) => error!(room = %self.room, error = %err, "Snapshot encoding failed"),
        }
    }

    async fn handle_inbound(&mut self, id: SessionId, text: &str) {
        if self.registry.is_quit(id) {
            warn!(room = %self.room, session = %id, "Closing broken session");
            self.registry
                .close_session(id, CLOSE_BROKEN_CODE, CLOSE_BROKEN_REASON)
                .await;
            self.registry.remove_quit();
            return;
        }

        let event = match codec::decode_client(text) {
            Ok(ClientMessage::KeepAlive) => {
                trace!(room = %self.room, session = %id, "Keep-alive");
                return;
            }
            Ok(ClientMessage::Event(event)) => event,
            Err(err) => {
                warn!(room = %self.room, session = %id, error = %err, "Malformed message");
                self.report_error(id, &err.to_string()).await;
                return;
            }
        };

        match self.pipeline.apply(&event).await {
            Ok(ApplyOutcome::Applied {
                patch,
                persist_error,
            }) => {
                match broadcast(&patch, &mut self.registry).await {
                    Ok(delivered) => {
                        trace!(room = %self.room, delivered, "Broadcast complete");
                    }
                    Err(err) => {
                        error!(room = %self.room, error = %err, "Patch encoding failed");
                    }
                }

                self.pipeline.record_event(&event).await;

                if let Some(err) = persist_error {
                    self.report_error(id, &format!("failed to persist state: {err}"))
                        .await;
                }
            }
            Ok(ApplyOutcome::Ignored) => {
                // Unknown events are no-op commands, not errors; the sender
                // gets no frame.
                warn!(room = %self.room, event = %event.name, "Ignoring unknown event");
            }
            Err(err) => {
                warn!(room = %self.room, session = %id, error = %err, "Reducer failed");
                self.report_error(id, &err.to_string()).await;
            }
        }
    }

    fn handle_closed(&mut self, id: SessionId) {
        let before = self.registry.len();
        self.registry.mark_quit(id);
        self.registry.remove_quit();
        debug!(
            room = %self.room,
            session = %id,
            before,
            after = self.registry.len(),
            "Session closed"
        );
    }

    async fn report_error(&mut self, id: SessionId, message: &str) {
        let encoded = match codec::encode_server(&ServerMessage::error(message)) {
            Ok(encoded) => encoded,
            Err(err) => {
                error!(room = %self.room, error = %err, "Error encoding failed");
                return;
            }
        };
        if self.registry.send_to(id, &encoded).await.is_err() {
            // The flagged session is swept up by the next compaction pass.
            debug!(room = %self.room, session = %id, "Error delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{CountingStore, TestReducer};
    use crate::session::testing::{texts, Delivery, RecordingSink};
    use roomsync_store::{MemoryStore, STATE_KEY};
    use serde_json::json;

    fn spawn_hub(store: Arc<dyn Store>) -> HubHandle {
        HubActor::spawn("test-room", Arc::new(TestReducer), store, HubConfig::default())
    }

    /// Wait until every previously sent command has been processed.
    ///
    /// Snapshot replies are sequenced behind earlier mailbox commands, so
    /// awaiting one acts as a barrier.
    async fn barrier(hub: &HubHandle) -> Value {
        hub.snapshot().await.unwrap()
    }

    #[tokio::test]
    async fn test_attach_sends_full_snapshot() {
        let hub = spawn_hub(Arc::new(MemoryStore::new()));
        let (sink, log) = RecordingSink::new();
        hub.attach(Box::new(sink)).await.unwrap();

        barrier(&hub).await;
        assert_eq!(texts(&log), vec![r#"{"counter":0}"#.to_owned()]);
    }

    #[tokio::test]
    async fn test_counter_scenario_converges() {
        let hub = spawn_hub(Arc::new(MemoryStore::new()));
        let (first, first_log) = RecordingSink::new();
        let (second, second_log) = RecordingSink::new();
        let first_id = hub.attach(Box::new(first)).await.unwrap();
        hub.attach(Box::new(second)).await.unwrap();

        hub.inbound(first_id, r#"{"name": "increase"}"#.to_owned())
            .await
            .unwrap();
        barrier(&hub).await;

        // Both live sessions observe the diff, not the full state.
        assert_eq!(texts(&first_log).last().unwrap(), r#"{"counter":1}"#);
        assert_eq!(texts(&second_log).last().unwrap(), r#"{"counter":1}"#);

        hub.inbound(first_id, r#"{"name": "decrease", "amount": 4}"#.to_owned())
            .await
            .unwrap();
        let state = barrier(&hub).await;

        assert_eq!(texts(&first_log).last().unwrap(), r#"{"counter":-3}"#);
        assert_eq!(texts(&second_log).last().unwrap(), r#"{"counter":-3}"#);
        assert_eq!(state, json!({"counter": -3}));
    }

    #[tokio::test]
    async fn test_snapshot_before_and_after_events() {
        let store = Arc::new(MemoryStore::new());
        let hub = spawn_hub(store.clone());

        // Idempotent: a snapshot before any event is the default state,
        // and hydration persists it.
        assert_eq!(hub.snapshot().await.unwrap(), json!({"counter": 0}));
        assert_eq!(
            store.get("test-room", STATE_KEY).await.unwrap(),
            Some(json!({"counter": 0}))
        );

        let (sink, _) = RecordingSink::new();
        let id = hub.attach(Box::new(sink)).await.unwrap();
        hub.inbound(id, r#"{"name": "increase"}"#.to_owned())
            .await
            .unwrap();

        assert_eq!(hub.snapshot().await.unwrap(), json!({"counter": 1}));
        assert_eq!(
            store.get("test-room", STATE_KEY).await.unwrap(),
            Some(json!({"counter": 1}))
        );
    }

    #[tokio::test]
    async fn test_keepalive_is_a_full_noop() {
        let store = CountingStore::new();
        let hub = spawn_hub(store.clone());

        let (sink, log) = RecordingSink::new();
        let id = hub.attach(Box::new(sink)).await.unwrap();
        barrier(&hub).await;
        let baseline_puts = store.put_count();
        let baseline_frames = texts(&log).len();

        hub.inbound(id, "ping".to_owned()).await.unwrap();
        barrier(&hub).await;

        assert_eq!(store.put_count(), baseline_puts);
        assert_eq!(texts(&log).len(), baseline_frames);
    }

    #[tokio::test]
    async fn test_malformed_message_is_isolated_to_sender() {
        let store = Arc::new(MemoryStore::new());
        let hub = spawn_hub(store.clone());
        let (sender, sender_log) = RecordingSink::new();
        let (other, other_log) = RecordingSink::new();
        let sender_id = hub.attach(Box::new(sender)).await.unwrap();
        hub.attach(Box::new(other)).await.unwrap();
        barrier(&hub).await;
        let other_frames = texts(&other_log).len();

        hub.inbound(sender_id, "{not json".to_owned()).await.unwrap();
        let state = barrier(&hub).await;

        let frames = texts(&sender_log);
        assert!(frames.last().unwrap().starts_with(r#"{"error":"#));
        // The other session saw nothing, and the state never moved.
        assert_eq!(texts(&other_log).len(), other_frames);
        assert_eq!(state, json!({"counter": 0}));
    }

    #[tokio::test]
    async fn test_unknown_event_is_silently_discarded() {
        let store = Arc::new(MemoryStore::new());
        let hub = spawn_hub(store.clone());
        let (sink, log) = RecordingSink::new();
        let id = hub.attach(Box::new(sink)).await.unwrap();
        barrier(&hub).await;
        let frames = texts(&log).len();

        hub.inbound(id, r#"{"name": "frobnicate"}"#.to_owned())
            .await
            .unwrap();
        let state = barrier(&hub).await;

        // No broadcast, no error frame, no state change.
        assert_eq!(texts(&log).len(), frames);
        assert_eq!(state, json!({"counter": 0}));
        assert_eq!(
            store.get("test-room", STATE_KEY).await.unwrap(),
            Some(json!({"counter": 0}))
        );
    }

    #[tokio::test]
    async fn test_broken_session_does_not_disrupt_broadcast() {
        let hub = spawn_hub(Arc::new(MemoryStore::new()));
        let (a, a_log) = RecordingSink::new();
        let (broken, _) = RecordingSink::failing();
        let (c, c_log) = RecordingSink::new();
        let a_id = hub.attach(Box::new(a)).await.unwrap();
        hub.attach(Box::new(broken)).await.unwrap();
        hub.attach(Box::new(c)).await.unwrap();

        hub.inbound(a_id, r#"{"name": "increase"}"#.to_owned())
            .await
            .unwrap();
        barrier(&hub).await;

        assert_eq!(texts(&a_log).last().unwrap(), r#"{"counter":1}"#);
        assert_eq!(texts(&c_log).last().unwrap(), r#"{"counter":1}"#);
    }

    #[tokio::test]
    async fn test_quit_session_message_gets_close_frame() {
        let hub = spawn_hub(Arc::new(MemoryStore::new()));

        // Snapshot delivery fails, flagging the session quit while it is
        // still registered; close still succeeds and is recorded.
        let (sink, log) = RecordingSink::failing();
        let id = hub.attach(Box::new(sink)).await.unwrap();
        barrier(&hub).await;

        hub.inbound(id, r#"{"name": "increase"}"#.to_owned())
            .await
            .unwrap();
        barrier(&hub).await;

        let deliveries = log.lock().unwrap().clone();
        assert_eq!(
            deliveries,
            vec![Delivery::Close {
                code: CLOSE_BROKEN_CODE,
                reason: CLOSE_BROKEN_REASON.to_owned(),
            }]
        );
    }

    #[tokio::test]
    async fn test_reducer_error_reported_to_sender_only() {
        let hub = spawn_hub(Arc::new(MemoryStore::new()));
        let (sender, sender_log) = RecordingSink::new();
        let (other, other_log) = RecordingSink::new();
        let sender_id = hub.attach(Box::new(sender)).await.unwrap();
        hub.attach(Box::new(other)).await.unwrap();
        barrier(&hub).await;
        let other_frames = texts(&other_log).len();

        hub.inbound(sender_id, r#"{"name": "explode"}"#.to_owned())
            .await
            .unwrap();
        let state = barrier(&hub).await;

        assert_eq!(
            texts(&sender_log).last().unwrap(),
            r#"{"error":"reducer exploded"}"#
        );
        assert_eq!(texts(&other_log).len(), other_frames);
        assert_eq!(state, json!({"counter": 0}));
    }

    #[tokio::test]
    async fn test_persist_failure_reported_after_broadcast() {
        let store = CountingStore::new();
        let hub = spawn_hub(store.clone());
        let (sender, sender_log) = RecordingSink::new();
        let (other, other_log) = RecordingSink::new();
        let sender_id = hub.attach(Box::new(sender)).await.unwrap();
        hub.attach(Box::new(other)).await.unwrap();
        barrier(&hub).await;

        store.fail_writes(true);
        hub.inbound(sender_id, r#"{"name": "increase"}"#.to_owned())
            .await
            .unwrap();
        let state = barrier(&hub).await;

        // The broadcast still went out to everyone...
        assert_eq!(texts(&other_log).last().unwrap(), r#"{"counter":1}"#);
        // ...the sender additionally gets the persistence error...
        let frames = texts(&sender_log);
        assert_eq!(frames[frames.len() - 2], r#"{"counter":1}"#);
        assert!(frames.last().unwrap().contains("failed to persist state"));
        // ...and the in-memory state kept the merge.
        assert_eq!(state, json!({"counter": 1}));
    }

    #[tokio::test]
    async fn test_closed_session_is_removed_eagerly() {
        let hub = spawn_hub(Arc::new(MemoryStore::new()));
        let (a, a_log) = RecordingSink::new();
        let (b, b_log) = RecordingSink::new();
        let a_id = hub.attach(Box::new(a)).await.unwrap();
        let b_id = hub.attach(Box::new(b)).await.unwrap();

        hub.closed(b_id).await.unwrap();
        hub.inbound(a_id, r#"{"name": "increase"}"#.to_owned())
            .await
            .unwrap();
        barrier(&hub).await;

        assert_eq!(texts(&a_log).last().unwrap(), r#"{"counter":1}"#);
        // b only ever saw its attach snapshot.
        assert_eq!(texts(&b_log), vec![r#"{"counter":0}"#.to_owned()]);
    }

    #[tokio::test]
    async fn test_rooms_are_independent() {
        let store = Arc::new(MemoryStore::new());
        let reducer: Arc<dyn Reducer> = Arc::new(TestReducer);
        let one = HubActor::spawn("one", reducer.clone(), store.clone(), HubConfig::default());
        let two = HubActor::spawn("two", reducer, store, HubConfig::default());

        let (sink, _) = RecordingSink::new();
        let id = one.attach(Box::new(sink)).await.unwrap();
        one.inbound(id, r#"{"name": "increase"}"#.to_owned())
            .await
            .unwrap();

        assert_eq!(one.snapshot().await.unwrap(), json!({"counter": 1}));
        assert_eq!(two.snapshot().await.unwrap(), json!({"counter": 0}));
    }
}
