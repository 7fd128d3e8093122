//! SQLite store backend.
//!
//! A single `room_kv` table keyed by `(room, key)` holds the JSON-encoded
//! values for every room served by this process.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::traits::{Store, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS room_kv (
    room  TEXT NOT NULL,
    key   TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (room, key)
)
"#;

/// A durable store backed by SQLite.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(backend)?;

        info!(path = %path.display(), "Opened SQLite store");
        Self::with_pool(pool).await
    }

    /// Open an in-memory database, mainly for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(backend)?;

        // One connection only: each :memory: connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(backend)?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(SCHEMA).execute(&pool).await.map_err(backend)?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, room: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM room_kv WHERE room = ? AND key = ?")
                .bind(room)
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

        match row {
            Some((text,)) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, room: &str, key: &str, value: &Value) -> Result<(), StoreError> {
        let text = serde_json::to_string(value)?;

        sqlx::query(
            "INSERT INTO room_kv (room, key, value) VALUES (?, ?, ?) \
             ON CONFLICT (room, key) DO UPDATE SET value = excluded.value",
        )
        .bind(room)
        .bind(key)
        .bind(text)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{EVENT_KEY, STATE_KEY};
    use serde_json::json;

    #[tokio::test]
    async fn test_get_absent_key() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(store.get("room", STATE_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .put("room", STATE_KEY, &json!({"counter": 7}))
            .await
            .unwrap();

        let value = store.get("room", STATE_KEY).await.unwrap();
        assert_eq!(value, Some(json!({"counter": 7})));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.put("room", STATE_KEY, &json!({"counter": 1})).await.unwrap();
        store.put("room", STATE_KEY, &json!({"counter": 2})).await.unwrap();

        let value = store.get("room", STATE_KEY).await.unwrap();
        assert_eq!(value, Some(json!({"counter": 2})));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.put("room", STATE_KEY, &json!({"counter": 1})).await.unwrap();
        store
            .put("room", EVENT_KEY, &json!({"name": "increase"}))
            .await
            .unwrap();

        assert_eq!(
            store.get("room", STATE_KEY).await.unwrap(),
            Some(json!({"counter": 1}))
        );
        assert_eq!(
            store.get("room", EVENT_KEY).await.unwrap(),
            Some(json!({"name": "increase"}))
        );
    }
}
