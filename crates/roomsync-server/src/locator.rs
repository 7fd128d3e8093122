//! The hub locator: room key to hub instance.
//!
//! Hubs are created lazily on first access and live for the rest of the
//! process; every later request for the same room key reaches the same
//! actor, which is what makes it the single writer for that room.

use std::sync::Arc;

use dashmap::DashMap;
use roomsync_core::{HubActor, HubConfig, HubHandle, Reducer};
use roomsync_store::Store;
use tracing::debug;

/// Maximum room key length.
pub const MAX_ROOM_KEY_LENGTH: usize = 256;

/// Validate a room key.
///
/// # Errors
///
/// Returns an error message if the room key is invalid.
pub fn validate_room_key(key: &str) -> Result<(), &'static str> {
    if key.is_empty() {
        return Err("Room key cannot be empty");
    }
    if key.len() > MAX_ROOM_KEY_LENGTH {
        return Err("Room key too long");
    }
    if !key.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Room key contains invalid characters");
    }
    Ok(())
}

/// Maps room keys to hub actors, creating them on first access.
pub struct HubLocator {
    hubs: DashMap<String, HubHandle>,
    reducer: Arc<dyn Reducer>,
    store: Arc<dyn Store>,
    hub_config: HubConfig,
}

impl HubLocator {
    /// Create a locator that spawns hubs with the given collaborators.
    #[must_use]
    pub fn new(reducer: Arc<dyn Reducer>, store: Arc<dyn Store>, hub_config: HubConfig) -> Self {
        Self {
            hubs: DashMap::new(),
            reducer,
            store,
            hub_config,
        }
    }

    /// Resolve the hub for `room`, spawning it on first access.
    #[must_use]
    pub fn hub(&self, room: &str) -> HubHandle {
        self.hubs
            .entry(room.to_owned())
            .or_insert_with(|| {
                debug!(room = %room, "Creating hub");
                HubActor::spawn(
                    room,
                    Arc::clone(&self.reducer),
                    Arc::clone(&self.store),
                    self.hub_config.clone(),
                )
            })
            .clone()
    }

    /// Number of rooms with a live hub.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.hubs.len()
    }
}
