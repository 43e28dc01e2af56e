//! Socket frame definitions
//!
//! Frames are JSON objects tagged by `kind` with the body under `payload`.
//! Inbound frames come from clients; outbound frames go to them. The bus
//! payload types for chat traffic live here too, since they are shaped by
//! the frames that carry them.

use crate::error::{MatchingError, Result};
use crate::types::{RoomId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Frames a client may send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum InboundFrame {
    /// A chat message for the sender's room
    Message { room_id: RoomId, body: String },
    /// The client has entered a room's chat view
    Join { room_id: RoomId },
    /// The client is done chatting; doubles as the early-promotion signal
    Leave { room_id: RoomId },
    /// The end-of-chat pick; `target` absent means an explicit skip
    FinalChoice {
        room_id: RoomId,
        #[serde(default)]
        target: Option<UserId>,
    },
    /// Liveness reply to a server ping
    Pong,
}

impl InboundFrame {
    /// Parse a client text frame, surfacing malformed input as a typed error
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| {
            MatchingError::InvalidFrame {
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// Frames the server may send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// A room chat message, addressed by display identity
    Chat {
        room_id: RoomId,
        sender: String,
        body: String,
        timestamp: DateTime<Utc>,
    },
    /// Latest-message preview for room list views
    ChatLatest {
        room_id: RoomId,
        preview: String,
        timestamp: DateTime<Utc>,
    },
    /// Chat phase ended; the final-choice window is open
    RoomTimeout {
        room_id: RoomId,
        inactive: Vec<UserId>,
        choice_ends_at: DateTime<Utc>,
    },
    /// Personal prompt to make the end-of-chat pick
    FinalChoiceStart {
        room_id: RoomId,
        choice_ends_at: DateTime<Utc>,
        seconds_left: u64,
    },
    /// The room's resolved couples
    FinalChoiceResult {
        room_id: RoomId,
        couples: Vec<(UserId, UserId)>,
    },
    /// The recipient is in a mutual pair; a couple room is being opened
    CoupleMatchSuccess { match_id: Uuid, partner: UserId },
    /// Liveness probe
    Ping,
}

impl OutboundFrame {
    pub fn to_text(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            MatchingError::InternalError {
                message: format!("Failed to serialize outbound frame: {}", e),
            }
            .into()
        })
    }
}

/// Bus payload for `chat` app events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub room_id: RoomId,
    pub sender_id: UserId,
    /// Display identity shown to other members; absent in couple rooms
    pub display_name: Option<String>,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// Bus payload for `chat.latest` app events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPreview {
    pub room_id: RoomId,
    pub preview: String,
    pub timestamp: DateTime<Utc>,
}

/// Bus payload for `room.join` / `room.leave` app events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomMembership {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
}

/// Characters kept in a `chat.latest` preview
const PREVIEW_LIMIT: usize = 40;

/// Truncate a chat body for list previews on a character boundary
pub fn preview_of(body: &str) -> String {
    if body.chars().count() <= PREVIEW_LIMIT {
        body.to_string()
    } else {
        body.chars().take(PREVIEW_LIMIT).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_parse_message_frame() {
        let room_id = Uuid::new_v4();
        let text = format!(
            r#"{{"kind":"message","payload":{{"room_id":"{}","body":"hello"}}}}"#,
            room_id
        );
        let frame = InboundFrame::parse(&text).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Message {
                room_id,
                body: "hello".to_string()
            }
        );
    }

    #[test]
    fn test_parse_final_choice_skip_omits_target() {
        let room_id = Uuid::new_v4();
        let text = format!(
            r#"{{"kind":"final_choice","payload":{{"room_id":"{}"}}}}"#,
            room_id
        );
        let frame = InboundFrame::parse(&text).unwrap();
        assert_eq!(
            frame,
            InboundFrame::FinalChoice {
                room_id,
                target: None
            }
        );
    }

    #[test]
    fn test_parse_pong_without_payload() {
        assert_eq!(
            InboundFrame::parse(r#"{"kind":"pong"}"#).unwrap(),
            InboundFrame::Pong
        );
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        assert!(InboundFrame::parse(r#"{"kind":"teleport","payload":{}}"#).is_err());
        assert!(InboundFrame::parse("not json").is_err());
    }

    #[test]
    fn test_outbound_frame_shape() {
        let text = OutboundFrame::Ping.to_text().unwrap();
        assert_eq!(text, r#"{"kind":"ping"}"#);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "가".repeat(60);
        let preview = preview_of(&long);
        assert_eq!(preview.chars().count(), 40);
        assert_eq!(preview_of("short"), "short");
    }
}
