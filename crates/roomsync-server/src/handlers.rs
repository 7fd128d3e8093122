//! Connection handlers for the roomsync server.
//!
//! This module routes requests to hub instances and handles the WebSocket
//! connection lifecycle. A request for a room either upgrades into a live
//! session or is answered with a full-state snapshot.

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use roomsync_core::{HubHandle, SessionError, SessionSink};
use roomsync_protocol::{codec, ServerMessage};
use roomsync_store::{MemoryStore, SqliteStore, Store};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::locator::{validate_room_key, HubLocator};
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::reducer::CounterReducer;

/// Shared server state.
pub struct AppState {
    /// Room key to hub instance resolution.
    pub locator: HubLocator,
    /// Server configuration.
    pub config: Config,
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the server fails to
/// start.
pub async fn run_server(config: Config) -> Result<()> {
    let store: Arc<dyn Store> = if config.storage.path.is_empty() {
        warn!("No storage path configured, state will not survive restarts");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(SqliteStore::open(&config.storage.path).await?)
    };

    let locator = HubLocator::new(Arc::new(CounterReducer), store, config.hub_config());
    let state = Arc::new(AppState {
        locator,
        config: config.clone(),
    });

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    // Build router
    let app = Router::new()
        .route("/rooms/:room", get(room_handler))
        .route("/socket", get(socket_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;

    info!("roomsync server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/rooms/{{room}}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Handler for `/rooms/{room}`.
async fn room_handler(
    Path(room): Path<String>,
    ws: Option<WebSocketUpgrade>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if let Err(reason) = validate_room_key(&room) {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": reason }))).into_response();
    }
    serve_room(room, ws, state).await
}

/// Handler for `/socket`, serving the configured default room.
async fn socket_handler(ws: Option<WebSocketUpgrade>, State(state): State<Arc<AppState>>) -> Response {
    let room = state.config.default_room.clone();
    serve_room(room, ws, state).await
}

/// Dispatch a room request: upgrade into a session, or answer a snapshot.
async fn serve_room(room: String, ws: Option<WebSocketUpgrade>, state: Arc<AppState>) -> Response {
    let hub = state.locator.hub(&room);
    metrics::set_active_rooms(state.locator.room_count());

    match ws {
        Some(upgrade) => upgrade
            .max_message_size(state.config.limits.max_message_size)
            .on_upgrade(move |socket| handle_websocket(socket, hub)),
        None => match hub.snapshot().await {
            Ok(snapshot) => Json(snapshot).into_response(),
            Err(err) => {
                error!(room = %room, error = %err, "Snapshot request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": err.to_string() })),
                )
                    .into_response()
            }
        },
    }
}

/// Outbound half of a WebSocket session, handed to the hub.
struct WsSink {
    tx: mpsc::Sender<Message>,
}

#[async_trait]
impl SessionSink for WsSink {
    async fn send_text(&mut self, text: &str) -> Result<(), SessionError> {
        self.tx
            .send(Message::Text(text.to_owned()))
            .await
            .map_err(|_| SessionError::Closed)
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), SessionError> {
        self.tx
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: Cow::Owned(reason.to_owned()),
            })))
            .await
            .map_err(|_| SessionError::Closed)
    }
}

/// Handle a WebSocket connection for one room.
async fn handle_websocket(socket: WebSocket, hub: HubHandle) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (mut sender, mut receiver) = socket.split();

    // All outbound traffic funnels through one writer task; the hub and the
    // read loop both hold senders into it.
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(64);
    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if let Message::Text(text) = &message {
                metrics::record_message(text.len(), "outbound");
            }
            if sender.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    let sink = WsSink {
        tx: out_tx.clone(),
    };
    let session = match hub.attach(Box::new(sink)).await {
        Ok(id) => id,
        Err(err) => {
            warn!(room = %hub.room(), error = %err, "Attach failed");
            writer.abort();
            return;
        }
    };

    debug!(room = %hub.room(), session = %session, "WebSocket connected");

    while let Some(received) = receiver.next().await {
        match received {
            Ok(Message::Text(text)) => {
                metrics::record_message(text.len(), "inbound");
                if hub.inbound(session, text).await.is_err() {
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                metrics::record_error("binary_frame");
                let reply = ServerMessage::error("binary frames are not supported");
                if let Ok(text) = codec::encode_server(&reply) {
                    if out_tx.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            }
            Ok(Message::Ping(data)) => {
                if out_tx.send(Message::Pong(data)).await.is_err() {
                    break;
                }
            }
            Ok(Message::Pong(_)) => {
                // Ignore pongs
            }
            Ok(Message::Close(_)) => {
                debug!(room = %hub.room(), session = %session, "Received close frame");
                break;
            }
            Err(e) => {
                warn!(room = %hub.room(), session = %session, error = %e, "WebSocket error");
                metrics::record_error("websocket");
                break;
            }
        }
    }

    // Close or error: tell the hub so the session is compacted eagerly.
    if let Err(err) = hub.closed(session).await {
        warn!(room = %hub.room(), error = %err, "Close notification failed");
    }
    writer.abort();

    debug!(room = %hub.room(), session = %session, "WebSocket disconnected");
}
