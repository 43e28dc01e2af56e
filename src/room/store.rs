//! Durable room record storage
//!
//! The durable store is authoritative for room identity and audit history;
//! everything ephemeral (deadlines, votes, presence) lives in the shared
//! store. The trait keeps the manager independent of the backing database.
//! Production runs on the Redis-backed implementation, where every process
//! sees the same records and any of them can drive a room's transitions;
//! the in-memory implementation serves tests and dry runs.

use crate::error::{MatchingError, Result};
use crate::store::keys;
use crate::types::{Room, RoomId, RoomStatus, UserId};
use crate::utils::current_timestamp;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;

/// Trait for durable room record operations
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Insert or replace a room record
    async fn upsert(&self, room: Room) -> Result<()>;

    /// Fetch a room by id
    async fn get(&self, room_id: RoomId) -> Result<Option<Room>>;

    /// Advance a room to its next status, enforcing the strict progression
    async fn advance_status(&self, room_id: RoomId, to: RoomStatus) -> Result<Room>;

    /// Record the choice-phase deadline
    async fn set_choice_deadline(&self, room_id: RoomId, deadline: DateTime<Utc>) -> Result<()>;

    /// Remove a member from the durable member list
    async fn remove_member(&self, room_id: RoomId, user_id: &UserId) -> Result<Room>;

    /// Delete a room record entirely
    async fn delete(&self, room_id: RoomId) -> Result<bool>;

    /// Number of stored rooms
    async fn count(&self) -> Result<usize>;
}

/// In-memory room store implementation
#[derive(Debug, Default)]
pub struct MemoryRoomStore {
    rooms: RwLock<HashMap<RoomId, Room>>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err() -> anyhow::Error {
        MatchingError::InternalError {
            message: "Failed to acquire room store lock".to_string(),
        }
        .into()
    }
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn upsert(&self, room: Room) -> Result<()> {
        let mut rooms = self.rooms.write().map_err(|_| Self::lock_err())?;
        rooms.insert(room.id, room);
        Ok(())
    }

    async fn get(&self, room_id: RoomId) -> Result<Option<Room>> {
        let rooms = self.rooms.read().map_err(|_| Self::lock_err())?;
        Ok(rooms.get(&room_id).cloned())
    }

    async fn advance_status(&self, room_id: RoomId, to: RoomStatus) -> Result<Room> {
        let mut rooms = self.rooms.write().map_err(|_| Self::lock_err())?;
        let room = rooms
            .get_mut(&room_id)
            .ok_or_else(|| MatchingError::RoomNotFound {
                room_id: room_id.to_string(),
            })?;

        if !room.status.can_advance_to(to) {
            return Err(MatchingError::InvalidTransition {
                from: room.status.to_string(),
                to: to.to_string(),
            }
            .into());
        }

        room.status = to;
        room.updated_at = current_timestamp();
        Ok(room.clone())
    }

    async fn set_choice_deadline(&self, room_id: RoomId, deadline: DateTime<Utc>) -> Result<()> {
        let mut rooms = self.rooms.write().map_err(|_| Self::lock_err())?;
        let room = rooms
            .get_mut(&room_id)
            .ok_or_else(|| MatchingError::RoomNotFound {
                room_id: room_id.to_string(),
            })?;
        room.choice_ends_at = Some(deadline);
        room.updated_at = current_timestamp();
        Ok(())
    }

    async fn remove_member(&self, room_id: RoomId, user_id: &UserId) -> Result<Room> {
        let mut rooms = self.rooms.write().map_err(|_| Self::lock_err())?;
        let room = rooms
            .get_mut(&room_id)
            .ok_or_else(|| MatchingError::RoomNotFound {
                room_id: room_id.to_string(),
            })?;
        room.members.retain(|m| &m.user_id != user_id);
        room.updated_at = current_timestamp();
        Ok(room.clone())
    }

    async fn delete(&self, room_id: RoomId) -> Result<bool> {
        let mut rooms = self.rooms.write().map_err(|_| Self::lock_err())?;
        Ok(rooms.remove(&room_id).is_some())
    }

    async fn count(&self) -> Result<usize> {
        let rooms = self.rooms.read().map_err(|_| Self::lock_err())?;
        Ok(rooms.len())
    }
}

/// Serialize a room record for storage
fn encode_room(room: &Room) -> Result<String> {
    serde_json::to_string(room).map_err(|e| {
        MatchingError::InternalError {
            message: format!("Failed to serialize room record: {}", e),
        }
        .into()
    })
}

/// Parse a stored room record
fn decode_room(raw: &str) -> Result<Room> {
    serde_json::from_str(raw).map_err(|e| {
        MatchingError::InternalError {
            message: format!("Failed to parse room record: {}", e),
        }
        .into()
    })
}

/// Redis-backed room store shared by the whole fleet
#[derive(Clone)]
pub struct RedisRoomStore {
    manager: ConnectionManager,
}

impl RedisRoomStore {
    /// Connect to Redis and build a managed connection
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| MatchingError::StoreUnavailable {
            message: format!("Invalid Redis URL: {}", e),
        })?;

        let manager =
            ConnectionManager::new(client)
                .await
                .map_err(|e| MatchingError::StoreUnavailable {
                    message: format!("Failed to connect to Redis: {}", e),
                })?;

        info!("Connected to Redis room store");
        Ok(Self { manager })
    }

    fn store_err(e: redis::RedisError) -> anyhow::Error {
        MatchingError::StoreUnavailable {
            message: e.to_string(),
        }
        .into()
    }

    async fn load(&self, room_id: RoomId) -> Result<Room> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .get(keys::room_record_key(room_id))
            .await
            .map_err(Self::store_err)?;
        let raw = raw.ok_or_else(|| MatchingError::RoomNotFound {
            room_id: room_id.to_string(),
        })?;
        decode_room(&raw)
    }

    async fn save(&self, room: &Room) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .set(keys::room_record_key(room.id), encode_room(room)?)
            .await
            .map_err(Self::store_err)?;
        Ok(())
    }
}

#[async_trait]
impl RoomStore for RedisRoomStore {
    async fn upsert(&self, room: Room) -> Result<()> {
        self.save(&room).await?;
        let mut conn = self.manager.clone();
        let _: i64 = conn
            .sadd(keys::ROOM_RECORDS, room.id.to_string())
            .await
            .map_err(Self::store_err)?;
        Ok(())
    }

    async fn get(&self, room_id: RoomId) -> Result<Option<Room>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .get(keys::room_record_key(room_id))
            .await
            .map_err(Self::store_err)?;
        raw.as_deref().map(decode_room).transpose()
    }

    async fn advance_status(&self, room_id: RoomId, to: RoomStatus) -> Result<Room> {
        let mut room = self.load(room_id).await?;
        if !room.status.can_advance_to(to) {
            return Err(MatchingError::InvalidTransition {
                from: room.status.to_string(),
                to: to.to_string(),
            }
            .into());
        }

        room.status = to;
        room.updated_at = current_timestamp();
        self.save(&room).await?;
        Ok(room)
    }

    async fn set_choice_deadline(&self, room_id: RoomId, deadline: DateTime<Utc>) -> Result<()> {
        let mut room = self.load(room_id).await?;
        room.choice_ends_at = Some(deadline);
        room.updated_at = current_timestamp();
        self.save(&room).await
    }

    async fn remove_member(&self, room_id: RoomId, user_id: &UserId) -> Result<Room> {
        let mut room = self.load(room_id).await?;
        room.members.retain(|m| &m.user_id != user_id);
        room.updated_at = current_timestamp();
        self.save(&room).await?;
        Ok(room)
    }

    async fn delete(&self, room_id: RoomId) -> Result<bool> {
        let mut conn = self.manager.clone();
        let deleted: i64 = conn
            .del(keys::room_record_key(room_id))
            .await
            .map_err(Self::store_err)?;
        let _: i64 = conn
            .srem(keys::ROOM_RECORDS, room_id.to_string())
            .await
            .map_err(Self::store_err)?;
        Ok(deleted > 0)
    }

    async fn count(&self) -> Result<usize> {
        let mut conn = self.manager.clone();
        let count: usize = conn
            .scard(keys::ROOM_RECORDS)
            .await
            .map_err(Self::store_err)?;
        Ok(count)
    }
}
