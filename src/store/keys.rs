//! Shared-store key layout
//!
//! All processes agree on these names; changing any of them is a fleet-wide
//! migration.

use crate::types::{Gender, RoomId};

/// Set of live (Chatting) room ids swept for chat-phase expiry
pub const ROOMS_LIVE: &str = "rooms:list";

/// Set of rooms in their choice phase swept for choice-phase expiry
pub const ROOMS_CHOICE: &str = "rooms:choice";

/// Hash of userId -> holder process id for every open connection
pub const ACTIVE_CLIENTS: &str = "client:active";

/// Membership set guarding against double enqueue
pub const WAITING_USERS: &str = "matching:waiting";

/// Monotonic sequence counter for group rooms
pub const ROOM_SEQ: &str = "rooms:seq";

/// Set of room ids holding a durable room record
pub const ROOM_RECORDS: &str = "rooms:records";

/// Wait list for one (gender, party-size) bucket
pub fn queue_key(gender: Gender, party_size: u32) -> String {
    format!("matching_queue_{}_{}", gender, party_size)
}

/// Set of a room's member user ids
pub fn room_members_key(room_id: RoomId) -> String {
    format!("room:{}", room_id)
}

/// Set of user ids currently joined to a room (socket-level join)
pub fn room_joined_key(room_id: RoomId) -> String {
    format!("join_room:{}", room_id)
}

/// Hash of voter -> chosen target for a room's final choice
pub fn room_choice_key(room_id: RoomId) -> String {
    format!("final_choice_room:{}", room_id)
}

/// TTL key holding the current phase deadline for a room
pub fn room_deadline_key(room_id: RoomId) -> String {
    format!("room_ttl:{}", room_id)
}

/// Counter of members that signalled ready-to-choose early
pub fn room_ready_key(room_id: RoomId) -> String {
    format!("room_ready:{}", room_id)
}

/// Serialized durable room record
pub fn room_record_key(room_id: RoomId) -> String {
    format!("room_record:{}", room_id)
}
