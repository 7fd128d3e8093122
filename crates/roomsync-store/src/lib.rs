//! # roomsync-store
//!
//! Durable per-room key-value storage for the roomsync state hub.
//!
//! Every hub instance persists two logical keys under its room:
//!
//! - [`STATE_KEY`] - the current room state, a JSON object
//! - [`EVENT_KEY`] - the most recently applied raw event, for diagnostics
//!
//! All backends implement the [`Store`] trait, keeping the hub agnostic of
//! where its state lives.

pub mod memory;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
pub use traits::{Store, StoreError, EVENT_KEY, STATE_KEY};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
