//! In-memory store backend.
//!
//! Used by tests and by servers running without a storage path configured.
//! State held here does not survive a process restart.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::traits::{Store, StoreError};

/// A non-durable store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<(String, String), Value>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries across all rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, room: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let value = self
            .entries
            .get(&(room.to_owned(), key.to_owned()))
            .map(|entry| entry.value().clone());
        Ok(value)
    }

    async fn put(&self, room: &str, key: &str, value: &Value) -> Result<(), StoreError> {
        self.entries
            .insert((room.to_owned(), key.to_owned()), value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::STATE_KEY;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_absent_key() {
        let store = MemoryStore::new();
        assert_eq!(store.get("room", STATE_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemoryStore::new();
        store
            .put("room", STATE_KEY, &json!({"counter": 1}))
            .await
            .unwrap();

        let value = store.get("room", STATE_KEY).await.unwrap();
        assert_eq!(value, Some(json!({"counter": 1})));
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let store = MemoryStore::new();
        store.put("a", STATE_KEY, &json!({"counter": 1})).await.unwrap();

        assert_eq!(store.get("b", STATE_KEY).await.unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = MemoryStore::new();
        store.put("room", STATE_KEY, &json!({"counter": 1})).await.unwrap();
        store.put("room", STATE_KEY, &json!({"counter": 2})).await.unwrap();

        let value = store.get("room", STATE_KEY).await.unwrap();
        assert_eq!(value, Some(json!({"counter": 2})));
    }
}
