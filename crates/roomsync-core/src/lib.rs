//! # roomsync-core
//!
//! The single-writer state hub at the heart of roomsync.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **HubActor** - one actor per room, owning state and sessions
//! - **Pipeline** - the serialized apply-persist-broadcast sequence
//! - **SessionRegistry** - live sessions with quit-flag tracking
//! - **Reducer** - the pluggable `(state, event) -> patch` seam
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ SessionSink │────▶│  HubActor   │────▶│  Pipeline   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                   │                   │
//!        │                   ▼                   ▼
//!        │            ┌─────────────┐     ┌─────────────┐
//!        └────────────│ Broadcaster │     │    Store    │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! Every command for one room flows through that room's mailbox, so the
//! reducer/merge/persist/broadcast sequence of one event always finishes
//! before the next event begins.

pub mod broadcast;
pub mod hub;
pub mod merge;
pub mod pipeline;
pub mod reducer;
pub mod session;

pub use hub::{HubActor, HubConfig, HubError, HubHandle};
pub use merge::deep_merge;
pub use pipeline::{ApplyOutcome, Pipeline};
pub use reducer::{ReduceError, Reducer};
pub use session::{SessionError, SessionId, SessionRegistry, SessionSink};
