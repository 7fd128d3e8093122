//! Fan-out of a state patch to every live session.
//!
//! The patch is serialized once and delivered in insertion order. A failed
//! delivery flags that session quit and the pass continues; the registry is
//! compacted afterwards. No retries — reconnecting is the client's job.

use roomsync_protocol::{codec, ProtocolError, ServerMessage};
use serde_json::Value;
use tracing::debug;

use crate::session::SessionRegistry;

/// Broadcast a patch to every live session in the registry.
///
/// Returns the number of sessions the patch was delivered to.
///
/// # Errors
///
/// Returns an error only if the patch itself cannot be serialized; delivery
/// failures are absorbed by flagging the affected sessions.
pub async fn broadcast(
    patch: &Value,
    registry: &mut SessionRegistry,
) -> Result<usize, ProtocolError> {
    let encoded = codec::encode_server(&ServerMessage::patch(patch.clone()))?;

    debug!(
        payload = %encoded,
        sessions = registry.len(),
        "Broadcasting patch"
    );

    let mut delivered = 0;
    for session in registry.sessions_mut() {
        if session.quit {
            continue;
        }
        match session.sink.send_text(&encoded).await {
            Ok(()) => delivered += 1,
            Err(_) => {
                debug!(session = %session.id, "Send failed, flagging session quit");
                session.quit = true;
            }
        }
    }

    registry.remove_quit();
    Ok(delivered)
}
