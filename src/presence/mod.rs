//! Presence, sockets and fan-out
//!
//! One registry per process tracks local connections and claims users in the
//! fleet-wide presence hash; socket sessions feed client frames into the
//! matching pipeline and the bus feeds room traffic back out.

pub mod frames;
pub mod registry;
pub mod socket;

pub use frames::{ChatMessage, ChatPreview, InboundFrame, OutboundFrame, RoomMembership};
pub use registry::PresenceRegistry;
pub use socket::{handle_socket, SocketContext};
