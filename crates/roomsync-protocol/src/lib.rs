//! # roomsync-protocol
//!
//! Wire message definitions for the roomsync state hub.
//!
//! Clients and hubs exchange UTF-8 text frames carrying JSON:
//!
//! - `Event` - a named mutation request sent by a client
//! - keep-alive - the literal string `ping`, never forwarded to a hub
//! - patch - a sparse JSON object broadcast to every live session
//! - error - `{"error": "..."}`, sent only to the offending session
//!
//! ## Example
//!
//! ```rust
//! use roomsync_protocol::{codec, ClientMessage};
//!
//! let msg = codec::decode_client(r#"{"name": "increase", "amount": 2}"#).unwrap();
//! match msg {
//!     ClientMessage::Event(event) => assert_eq!(event.name, "increase"),
//!     ClientMessage::KeepAlive => unreachable!(),
//! }
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode_client, encode_server, ProtocolError};
pub use frames::{ClientMessage, Event, ServerMessage};
pub use frames::{CLOSE_BROKEN_CODE, CLOSE_BROKEN_REASON, KEEPALIVE};
