//! Real-time delivery transport.
//!
//! `registry` tracks which identities currently have a live connection,
//! `messages` defines the JSON frames, and `session` runs one actor per
//! accepted socket.

pub mod messages;
pub mod registry;
pub mod session;

pub use messages::{ClientMessage, ServerMessage};
pub use registry::{ConnectionId, ConnectionRegistry};
