//! AMQP message definitions and serialization
//!
//! Exchange topology: one topic exchange for general app events (routed by
//! key), fan-out exchanges for room creation and for match events. Every
//! message body is the `{ event_type, data }` envelope; correlation ids ride
//! in the AMQP message properties.

use crate::error::{MatchingError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Topic exchange carrying routed app events
pub const APP_EVENTS_EXCHANGE: &str = "mingle.app_events";
/// Fan-out exchange announcing new group rooms
pub const ROOM_CREATE_EXCHANGE: &str = "mingle.room_create";
/// Fan-out exchange announcing new couple rooms
pub const COUPLE_ROOM_CREATE_EXCHANGE: &str = "mingle.couple_room_create";
/// Fan-out exchange carrying completed-match announcements
pub const MATCH_EVENTS_EXCHANGE: &str = "mingle.match_events";

/// Shared work queue on the match exchange; the fleet competes for each
/// delivery so every match creates exactly one room
pub const MATCH_CONSUMER_QUEUE: &str = "mingle.room_manager";

/// Routing keys on the app events topic
pub const RK_CHAT: &str = "chat";
pub const RK_CHAT_LATEST: &str = "chat.latest";
pub const RK_ROOM_JOIN: &str = "room.join";
pub const RK_ROOM_LEAVE: &str = "room.leave";
pub const RK_ROOM_TIMEOUT: &str = "room.timeout";
pub const RK_FINAL_CHOICE_TIMEOUT: &str = "final.choice.timeout";

/// All app-event routing keys a presence consumer binds to
pub const APP_EVENT_ROUTING_KEYS: [&str; 6] = [
    RK_CHAT,
    RK_CHAT_LATEST,
    RK_ROOM_JOIN,
    RK_ROOM_LEAVE,
    RK_ROOM_TIMEOUT,
    RK_FINAL_CHOICE_TIMEOUT,
];

/// Event type discriminators inside the envelope
pub const EVENT_MATCH: &str = "match";
pub const EVENT_ROOM_CREATED: &str = "room_created";
pub const EVENT_COUPLE_ROOM_CREATED: &str = "couple_room_created";
pub const EVENT_CHAT_MESSAGE: &str = "chat_message";
pub const EVENT_CHAT_LATEST: &str = "chat_latest";
pub const EVENT_ROOM_JOIN: &str = "room_join";
pub const EVENT_ROOM_LEAVE: &str = "room_leave";
pub const EVENT_ROOM_TIMEOUT: &str = "room_timeout";
pub const EVENT_FINAL_CHOICE_TIMEOUT: &str = "final_choice_timeout";
pub const EVENT_FINAL_CHOICE_RESULT: &str = "final_choice_result";

/// Wire body of every bus message
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EventEnvelope {
    pub event_type: String,
    pub data: Value,
}

impl EventEnvelope {
    /// Wrap a serializable payload under an event type
    pub fn new<T: Serialize>(event_type: &str, data: &T) -> Result<Self> {
        let data = serde_json::to_value(data).map_err(|e| MatchingError::InternalError {
            message: format!("Failed to serialize event data: {}", e),
        })?;
        Ok(Self {
            event_type: event_type.to_string(),
            data,
        })
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            MatchingError::InternalError {
                message: format!("Failed to serialize envelope: {}", e),
            }
            .into()
        })
    }

    /// Deserialize an envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            MatchingError::InvalidFrame {
                reason: format!("Failed to deserialize envelope: {}", e),
            }
            .into()
        })
    }

    /// Decode the payload into a concrete event type
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            MatchingError::InvalidFrame {
                reason: format!(
                    "Failed to decode '{}' event data: {}",
                    self.event_type, e
                ),
            }
            .into()
        })
    }
}
