//! Common types used throughout the matchmaking and room service

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for users
pub type UserId = String;

/// Unique identifier for rooms (equal to the match id that formed the room)
pub type RoomId = Uuid;

/// Gender bucket used for queue keys and match ratios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// All configured gender buckets, in key order
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gender::Male => write!(f, "male"),
            Gender::Female => write!(f, "female"),
        }
    }
}

/// Kind of room a match produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Group,
    Couple,
}

impl std::fmt::Display for RoomKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomKind::Group => write!(f, "group"),
            RoomKind::Couple => write!(f, "couple"),
        }
    }
}

/// Lifecycle status of a room
///
/// The progression is strict: no transition may skip a state, and the
/// chat/choice transitions are driven by timers or quorum, never directly
/// by a client request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Forming,
    Chatting,
    ChoicePending,
    ChoiceComplete,
    Closed,
}

impl RoomStatus {
    /// Whether `next` is the single legal successor of `self`
    pub fn can_advance_to(&self, next: RoomStatus) -> bool {
        matches!(
            (self, next),
            (RoomStatus::Forming, RoomStatus::Chatting)
                | (RoomStatus::Chatting, RoomStatus::ChoicePending)
                | (RoomStatus::ChoicePending, RoomStatus::ChoiceComplete)
                | (RoomStatus::ChoiceComplete, RoomStatus::Closed)
        )
    }
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomStatus::Forming => write!(f, "forming"),
            RoomStatus::Chatting => write!(f, "chatting"),
            RoomStatus::ChoicePending => write!(f, "choice_pending"),
            RoomStatus::ChoiceComplete => write!(f, "choice_complete"),
            RoomStatus::Closed => write!(f, "closed"),
        }
    }
}

/// A user waiting in a match queue
///
/// Owned exclusively by the MatchQueue while queued; serialized as the queue
/// list entry, so `dequeue` must see the exact same serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingUser {
    pub user_id: UserId,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    pub address: String,
    pub party_size: u32,
}

/// Minimal public profile carried inside a MatchEvent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProfile {
    pub user_id: UserId,
    pub gender: Gender,
}

/// Announcement of a completed match, consumed exactly once to create a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchEvent {
    pub match_id: Uuid,
    pub kind: RoomKind,
    pub users: Vec<PublicProfile>,
    pub timestamp: DateTime<Utc>,
}

/// A member of a room with their assigned display identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMember {
    pub user_id: UserId,
    pub gender: Gender,
    /// Assigned from the fixed name pool for group rooms; absent for couples
    pub display_name: Option<String>,
}

/// The durable unit of play
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub kind: RoomKind,
    /// Monotonic sequence number, allocated for group rooms only
    pub seq: Option<u64>,
    pub members: Vec<RoomMember>,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    pub chat_ends_at: DateTime<Utc>,
    pub choice_ends_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    /// Member user ids in member order
    pub fn member_ids(&self) -> Vec<UserId> {
        self.members.iter().map(|m| m.user_id.clone()).collect()
    }

    /// Look up a member by user id
    pub fn member(&self, user_id: &str) -> Option<&RoomMember> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    /// Display identities keyed by user id (group rooms)
    pub fn display_names(&self) -> HashMap<UserId, String> {
        self.members
            .iter()
            .filter_map(|m| {
                m.display_name
                    .as_ref()
                    .map(|n| (m.user_id.clone(), n.clone()))
            })
            .collect()
    }
}

/// Payload of a `room.timeout` event: the room that expired and the members
/// who were not present when it did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomTimeout {
    pub room_id: RoomId,
    pub inactive: Vec<UserId>,
    pub choice_ends_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

/// Per-user notice that a room's final choice window has opened
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceStartNotice {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub choice_ends_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

/// Payload of a room-create event consumed by downstream chat/game services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomCreated {
    pub room_id: RoomId,
    pub kind: RoomKind,
    pub seq: Option<u64>,
    pub members: Vec<RoomMember>,
    pub chat_ends_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

impl RoomCreated {
    pub fn from_room(room: &Room) -> Self {
        Self {
            room_id: room.id,
            kind: room.kind,
            seq: room.seq,
            members: room.members.clone(),
            chat_ends_at: room.chat_ends_at,
            timestamp: room.created_at,
        }
    }
}

/// Outcome of finalizing a room's choice phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceOutcome {
    pub room_id: RoomId,
    /// User-id pairs that chose each other; one-sided votes never appear here
    pub couples: Vec<(UserId, UserId)>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_progression_is_strict() {
        assert!(RoomStatus::Forming.can_advance_to(RoomStatus::Chatting));
        assert!(RoomStatus::Chatting.can_advance_to(RoomStatus::ChoicePending));
        assert!(RoomStatus::ChoicePending.can_advance_to(RoomStatus::ChoiceComplete));
        assert!(RoomStatus::ChoiceComplete.can_advance_to(RoomStatus::Closed));

        // No skipping, no regressions
        assert!(!RoomStatus::Forming.can_advance_to(RoomStatus::ChoicePending));
        assert!(!RoomStatus::Chatting.can_advance_to(RoomStatus::ChoiceComplete));
        assert!(!RoomStatus::ChoicePending.can_advance_to(RoomStatus::Chatting));
        assert!(!RoomStatus::Closed.can_advance_to(RoomStatus::Forming));
        assert!(!RoomStatus::Chatting.can_advance_to(RoomStatus::Chatting));
    }

    #[test]
    fn test_gender_key_fragment() {
        assert_eq!(Gender::Male.to_string(), "male");
        assert_eq!(Gender::Female.to_string(), "female");
    }

    #[test]
    fn test_waiting_user_serialization_is_stable() {
        let user = WaitingUser {
            user_id: "u1".to_string(),
            gender: Gender::Female,
            birth_date: NaiveDate::from_ymd_opt(1998, 4, 2).unwrap(),
            address: "Seoul".to_string(),
            party_size: 2,
        };

        let json = serde_json::to_string(&user).unwrap();
        let back: WaitingUser = serde_json::from_str(&json).unwrap();
        assert_eq!(user, back);
        // dequeue relies on byte-identical re-serialization
        assert_eq!(json, serde_json::to_string(&back).unwrap());
    }

    #[test]
    fn test_room_display_names() {
        let room = Room {
            id: Uuid::new_v4(),
            kind: RoomKind::Group,
            seq: Some(7),
            members: vec![
                RoomMember {
                    user_id: "a".to_string(),
                    gender: Gender::Male,
                    display_name: Some("Apollo".to_string()),
                },
                RoomMember {
                    user_id: "b".to_string(),
                    gender: Gender::Female,
                    display_name: Some("Aurora".to_string()),
                },
            ],
            status: RoomStatus::Chatting,
            created_at: Utc::now(),
            chat_ends_at: Utc::now(),
            choice_ends_at: None,
            updated_at: Utc::now(),
        };

        let names = room.display_names();
        assert_eq!(names.get("a").unwrap(), "Apollo");
        assert_eq!(names.get("b").unwrap(), "Aurora");
        assert_eq!(room.member_ids(), vec!["a".to_string(), "b".to_string()]);
    }
}
