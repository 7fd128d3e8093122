//! Storage abstraction for roomsync hubs.
//!
//! The trait keeps hubs agnostic of the backing store, allowing the server
//! to run against SQLite in production and an in-memory map in tests.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Storage key for the current room state.
pub const STATE_KEY: &str = "socketState";

/// Storage key for the most recently applied raw event.
pub const EVENT_KEY: &str = "lastEvent";

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored value could not be serialized or deserialized.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The operation did not complete within the configured bound.
    #[error("store operation timed out")]
    Timeout,
}

/// A durable key-value store scoped by room.
///
/// `get` must return `Ok(None)` for keys that were never written. `put` may
/// be fire-and-forget from the caller's perspective; callers that care about
/// durability inspect the result.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read a value, returning `None` if the key is absent.
    async fn get(&self, room: &str, key: &str) -> Result<Option<Value>, StoreError>;

    /// Write a value, overwriting any previous one.
    async fn put(&self, room: &str, key: &str, value: &Value) -> Result<(), StoreError>;
}
