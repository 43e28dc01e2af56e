//! Room lifecycle management
//!
//! Rooms progress through a strict, timed state machine driven by match
//! events and by periodic sweeps over shared-store indices. The durable room
//! record lives behind the `RoomStore` trait; phase deadlines live as TTL
//! keys in the shared store.

pub mod manager;
pub mod names;
pub mod store;

// Re-export commonly used types
pub use manager::{RoomLifecycleManager, RoomManagerStats, RoomTimings};
pub use store::{MemoryRoomStore, RedisRoomStore, RoomStore};
