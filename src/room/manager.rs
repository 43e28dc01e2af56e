//! Room lifecycle manager
//!
//! Owns the `Forming -> Chatting -> ChoicePending -> ChoiceComplete -> Closed`
//! state machine. Rooms are created synchronously from match events; the
//! timed transitions are driven by sweep loops over the shared-store indices.
//! Several processes run the same sweeps concurrently; every transition is
//! gated on an index removal so the second sweeper's attempt is a no-op.

use crate::amqp::messages::{
    EventEnvelope, EVENT_FINAL_CHOICE_TIMEOUT, EVENT_ROOM_TIMEOUT, RK_FINAL_CHOICE_TIMEOUT,
    RK_ROOM_TIMEOUT,
};
use crate::amqp::publisher::EventPublisher;
use crate::choice::FinalChoiceAggregator;
use crate::error::{MatchingError, Result};
use crate::metrics::MetricsCollector;
use crate::room::names::display_name;
use crate::room::store::RoomStore;
use crate::store::{keys, SharedStore};
use crate::types::{
    ChoiceStartNotice, Gender, MatchEvent, Room, RoomCreated, RoomId, RoomKind, RoomMember,
    RoomStatus, RoomTimeout, UserId,
};
use crate::utils::current_timestamp;
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Phase durations and sweep cadence
#[derive(Debug, Clone)]
pub struct RoomTimings {
    pub group_chat: Duration,
    pub couple_chat: Duration,
    pub choice: Duration,
    pub sweep_interval: Duration,
}

impl Default for RoomTimings {
    fn default() -> Self {
        Self {
            group_chat: Duration::from_secs(1800),
            couple_chat: Duration::from_secs(86_400),
            choice: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(2),
        }
    }
}

impl RoomTimings {
    fn chat_duration(&self, kind: RoomKind) -> Duration {
        match kind {
            RoomKind::Group => self.group_chat,
            RoomKind::Couple => self.couple_chat,
        }
    }
}

/// Statistics about room manager operations
#[derive(Debug, Clone, Default)]
pub struct RoomManagerStats {
    /// Total rooms created from match events
    pub rooms_created: u64,
    /// Total chat phases expired into the choice phase
    pub rooms_timed_out: u64,
    /// Total rooms promoted early by member signals
    pub rooms_promoted_early: u64,
    /// Current number of durable room records
    pub active_rooms: usize,
}

/// The room lifecycle manager
pub struct RoomLifecycleManager {
    store: Arc<dyn SharedStore>,
    rooms: Arc<dyn RoomStore>,
    publisher: Arc<dyn EventPublisher>,
    aggregator: Arc<FinalChoiceAggregator>,
    timings: RoomTimings,
    metrics: Arc<MetricsCollector>,
    stats: Arc<RwLock<RoomManagerStats>>,
}

impl RoomLifecycleManager {
    pub fn new(
        store: Arc<dyn SharedStore>,
        rooms: Arc<dyn RoomStore>,
        publisher: Arc<dyn EventPublisher>,
        aggregator: Arc<FinalChoiceAggregator>,
        timings: RoomTimings,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store,
            rooms,
            publisher,
            aggregator,
            timings,
            metrics,
            stats: Arc::new(RwLock::new(RoomManagerStats::default())),
        }
    }

    /// Create a room from a completed match (Forming -> Chatting)
    ///
    /// Room id equals the match id, so a replayed match event overwrites the
    /// same record instead of creating a second room.
    pub async fn create_room(&self, event: MatchEvent) -> Result<Room> {
        info!(
            "Creating room from match - match_id: {}, kind: {}, users: {}",
            event.match_id,
            event.kind,
            event.users.len()
        );

        let seq = match event.kind {
            RoomKind::Group => Some(self.store.counter_incr(keys::ROOM_SEQ).await? as u64),
            RoomKind::Couple => None,
        };

        let members = assign_members(&event, seq);
        let now = current_timestamp();
        let chat_duration = self.timings.chat_duration(event.kind);
        let chat_ends_at = now
            + ChronoDuration::from_std(chat_duration).map_err(|e| {
                MatchingError::InternalError {
                    message: format!("Invalid chat duration: {}", e),
                }
            })?;

        let mut room = Room {
            id: event.match_id,
            kind: event.kind,
            seq,
            members,
            status: RoomStatus::Forming,
            created_at: now,
            chat_ends_at,
            choice_ends_at: None,
            updated_at: now,
        };

        self.rooms.upsert(room.clone()).await?;
        room = self.rooms.advance_status(room.id, RoomStatus::Chatting).await?;

        // Ephemeral state: member set, live index, chat deadline
        let members_key = keys::room_members_key(room.id);
        for member in &room.members {
            self.store.set_add(&members_key, &member.user_id).await?;
        }
        self.store
            .set_expiring(&keys::room_deadline_key(room.id), "chat", chat_duration)
            .await?;
        self.store
            .set_add(keys::ROOMS_LIVE, &room.id.to_string())
            .await?;

        let created = RoomCreated::from_room(&room);
        match room.kind {
            RoomKind::Group => self.publisher.publish_room_created(created).await?,
            RoomKind::Couple => self.publisher.publish_couple_room_created(created).await?,
        }

        self.metrics.record_room_created(room.kind);
        if let Ok(mut stats) = self.stats.write() {
            stats.rooms_created += 1;
        }

        info!(
            "Room created - room_id: {}, kind: {}, seq: {:?}, chat_ends_at: {}",
            room.id, room.kind, room.seq, room.chat_ends_at
        );
        Ok(room)
    }

    /// Promote a room to the choice phase (Chatting -> ChoicePending)
    ///
    /// Idempotent: the removal of the room from the live index is the gate,
    /// so only one caller ever publishes the timeout event. A failure after
    /// the gate puts the index entry back, so the next sweep retries instead
    /// of orphaning the room.
    pub async fn promote_room(&self, room_id: RoomId) -> Result<bool> {
        if !self
            .store
            .set_remove(keys::ROOMS_LIVE, &room_id.to_string())
            .await?
        {
            debug!("Room {} already promoted; skipping", room_id);
            return Ok(false);
        }

        match self.promote_room_gated(room_id).await {
            Ok(()) => Ok(true),
            Err(e) => {
                if let Err(restore) = self
                    .store
                    .set_add(keys::ROOMS_LIVE, &room_id.to_string())
                    .await
                {
                    warn!(
                        "Failed to restore live index entry for room {}: {}",
                        room_id, restore
                    );
                }
                Err(e)
            }
        }
    }

    /// The promotion body; runs only in the caller that won the index gate
    async fn promote_room_gated(&self, room_id: RoomId) -> Result<()> {
        let room = self
            .rooms
            .get(room_id)
            .await?
            .ok_or_else(|| MatchingError::RoomNotFound {
                room_id: room_id.to_string(),
            })?;

        // Members with no presence record anywhere in the fleet
        let mut inactive: Vec<UserId> = Vec::new();
        for member in &room.members {
            let present = self
                .store
                .hash_get(keys::ACTIVE_CLIENTS, &member.user_id)
                .await?
                .is_some();
            if !present {
                inactive.push(member.user_id.clone());
            }
        }

        let now = current_timestamp();
        let choice_ends_at = now
            + ChronoDuration::from_std(self.timings.choice).map_err(|e| {
                MatchingError::InternalError {
                    message: format!("Invalid choice duration: {}", e),
                }
            })?;

        self.rooms
            .advance_status(room_id, RoomStatus::ChoicePending)
            .await?;
        self.rooms.set_choice_deadline(room_id, choice_ends_at).await?;
        self.store
            .set_expiring(&keys::room_deadline_key(room_id), "choice", self.timings.choice)
            .await?;
        self.store
            .set_add(keys::ROOMS_CHOICE, &room_id.to_string())
            .await?;

        let timeout = RoomTimeout {
            room_id,
            inactive: inactive.clone(),
            choice_ends_at,
            timestamp: now,
        };
        self.publisher
            .publish_app_event(RK_ROOM_TIMEOUT, EventEnvelope::new(EVENT_ROOM_TIMEOUT, &timeout)?)
            .await?;

        // Personal prompt for each member; the holding process routes it to
        // the member's socket
        for member in &room.members {
            let notice = ChoiceStartNotice {
                room_id,
                user_id: member.user_id.clone(),
                choice_ends_at,
                timestamp: now,
            };
            self.publisher
                .publish_app_event(
                    RK_FINAL_CHOICE_TIMEOUT,
                    EventEnvelope::new(EVENT_FINAL_CHOICE_TIMEOUT, &notice)?,
                )
                .await?;
        }

        self.metrics.record_room_timeout();
        if let Ok(mut stats) = self.stats.write() {
            stats.rooms_timed_out += 1;
        }

        info!(
            "Room promoted to choice phase - room_id: {}, inactive: {:?}, choice_ends_at: {}",
            room_id, inactive, choice_ends_at
        );
        Ok(())
    }

    /// Record one member's ready-to-choose signal
    ///
    /// When every current member has signalled, the chat phase promotes
    /// immediately instead of waiting for the TTL.
    pub async fn signal_ready(&self, room_id: RoomId, user_id: &UserId) -> Result<bool> {
        let ready = self
            .store
            .counter_incr(&keys::room_ready_key(room_id))
            .await?;
        let members = self
            .store
            .set_len(&keys::room_members_key(room_id))
            .await?;

        debug!(
            "Ready signal - room_id: {}, user_id: '{}', ready: {}/{}",
            room_id, user_id, ready, members
        );

        if members > 0 && ready >= members as i64 {
            let promoted = self.promote_room(room_id).await?;
            if promoted {
                info!("Room {} promoted early by member signals", room_id);
                if let Ok(mut stats) = self.stats.write() {
                    stats.rooms_promoted_early += 1;
                }
            }
            return Ok(promoted);
        }
        Ok(false)
    }

    /// Drop a member from a room without changing room status
    pub async fn remove_member(&self, room_id: RoomId, user_id: &UserId) -> Result<()> {
        self.rooms.remove_member(room_id, user_id).await?;
        self.store
            .set_remove(&keys::room_members_key(room_id), user_id)
            .await?;
        self.store
            .set_remove(&keys::room_joined_key(room_id), user_id)
            .await?;

        info!(
            "Member removed from room - room_id: {}, user_id: '{}'",
            room_id, user_id
        );
        Ok(())
    }

    /// One pass of the chat-timeout sweep
    ///
    /// Enumerates the live-rooms index and promotes every room whose chat
    /// deadline TTL has run out. Returns the number of rooms promoted.
    pub async fn sweep_chat_once(&self) -> Result<usize> {
        let mut promoted = 0;
        for id in self.store.set_members(keys::ROOMS_LIVE).await? {
            let Ok(room_id) = id.parse::<RoomId>() else {
                warn!("Dropping unparseable live-room index entry: '{}'", id);
                self.store.set_remove(keys::ROOMS_LIVE, &id).await?;
                continue;
            };

            let expired = self
                .store
                .ttl_remaining(&keys::room_deadline_key(room_id))
                .await?
                .is_none();
            if !expired {
                continue;
            }

            match self.promote_room(room_id).await {
                Ok(true) => promoted += 1,
                Ok(false) => {}
                Err(e) => {
                    // Leave the room for the next pass; a concurrent sweeper
                    // may already have taken it.
                    error!("Failed to promote room {}: {}", room_id, e);
                }
            }
        }
        Ok(promoted)
    }

    /// One pass of the choice-timeout sweep
    ///
    /// Forces ChoiceComplete for every choice-phase room whose deadline TTL
    /// has run out, finalizing with whatever partial votes exist.
    pub async fn sweep_choice_once(&self) -> Result<usize> {
        let mut finalized = 0;
        for id in self.store.set_members(keys::ROOMS_CHOICE).await? {
            let Ok(room_id) = id.parse::<RoomId>() else {
                warn!("Dropping unparseable choice-room index entry: '{}'", id);
                self.store.set_remove(keys::ROOMS_CHOICE, &id).await?;
                continue;
            };

            let expired = self
                .store
                .ttl_remaining(&keys::room_deadline_key(room_id))
                .await?
                .is_none();
            if !expired {
                continue;
            }

            match self.aggregator.finalize_room(room_id).await {
                Ok(Some(outcome)) => {
                    info!(
                        "Choice phase timed out - room_id: {}, couples: {}",
                        room_id,
                        outcome.couples.len()
                    );
                    finalized += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Failed to finalize room {}: {}", room_id, e);
                }
            }
        }
        Ok(finalized)
    }

    /// Run the chat sweep for the life of the process
    pub async fn run_chat_sweep(self: Arc<Self>) {
        let mut ticker = interval(self.timings.sweep_interval);
        info!(
            "Chat-timeout sweep started - interval: {:?}",
            self.timings.sweep_interval
        );
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep_chat_once().await {
                error!("Chat sweep iteration failed: {}", e);
            }
        }
    }

    /// Run the choice sweep for the life of the process
    pub async fn run_choice_sweep(self: Arc<Self>) {
        let mut ticker = interval(self.timings.sweep_interval);
        info!(
            "Choice-timeout sweep started - interval: {:?}",
            self.timings.sweep_interval
        );
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep_choice_once().await {
                error!("Choice sweep iteration failed: {}", e);
            }
        }
    }

    /// Current manager statistics
    pub async fn get_stats(&self) -> Result<RoomManagerStats> {
        let mut stats = self
            .stats
            .read()
            .map_err(|_| MatchingError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?
            .clone();
        stats.active_rooms = self.rooms.count().await?;
        Ok(stats)
    }
}

#[async_trait]
impl crate::amqp::handlers::MatchEventHandler for RoomLifecycleManager {
    async fn handle_match_event(&self, event: MatchEvent) -> Result<()> {
        self.create_room(event).await?;
        Ok(())
    }
}

/// Build room members with round-robin display identities split by gender
fn assign_members(event: &MatchEvent, seq: Option<u64>) -> Vec<RoomMember> {
    let mut male_index = 0;
    let mut female_index = 0;

    event
        .users
        .iter()
        .map(|profile| {
            let display = seq.map(|seq| {
                let index = match profile.gender {
                    Gender::Male => {
                        male_index += 1;
                        male_index - 1
                    }
                    Gender::Female => {
                        female_index += 1;
                        female_index - 1
                    }
                };
                display_name(profile.gender, seq, index)
            });
            RoomMember {
                user_id: profile.user_id.clone(),
                gender: profile.gender,
                display_name: display,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amqp::messages::{
        COUPLE_ROOM_CREATE_EXCHANGE, EVENT_ROOM_CREATED, ROOM_CREATE_EXCHANGE,
    };
    use crate::amqp::publisher::MockEventPublisher;
    use crate::room::store::MemoryRoomStore;
    use crate::store::MemoryStore;
    use crate::types::PublicProfile;
    use crate::utils::generate_match_id;

    struct Harness {
        manager: RoomLifecycleManager,
        store: Arc<MemoryStore>,
        rooms: Arc<MemoryRoomStore>,
        publisher: Arc<MockEventPublisher>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let rooms = Arc::new(MemoryRoomStore::new());
        let publisher = Arc::new(MockEventPublisher::new());
        let aggregator = Arc::new(FinalChoiceAggregator::new(
            store.clone(),
            rooms.clone(),
            publisher.clone(),
            Duration::from_millis(10),
            Arc::new(MetricsCollector::new().unwrap()),
        ));
        let manager = RoomLifecycleManager::new(
            store.clone(),
            rooms.clone(),
            publisher.clone(),
            aggregator,
            RoomTimings::default(),
            Arc::new(MetricsCollector::new().unwrap()),
        );
        Harness {
            manager,
            store,
            rooms,
            publisher,
        }
    }

    fn group_match(users: &[(&str, Gender)]) -> MatchEvent {
        MatchEvent {
            match_id: generate_match_id(),
            kind: RoomKind::Group,
            users: users
                .iter()
                .map(|(id, gender)| PublicProfile {
                    user_id: id.to_string(),
                    gender: *gender,
                })
                .collect(),
            timestamp: current_timestamp(),
        }
    }

    #[tokio::test]
    async fn test_create_room_reaches_chatting_and_publishes() {
        let h = harness();
        let event = group_match(&[("m1", Gender::Male), ("f1", Gender::Female)]);
        let room = h.manager.create_room(event.clone()).await.unwrap();

        assert_eq!(room.id, event.match_id);
        assert_eq!(room.status, RoomStatus::Chatting);
        assert_eq!(room.seq, Some(1));
        assert!(room.members.iter().all(|m| m.display_name.is_some()));

        let created = h.publisher.published_to(ROOM_CREATE_EXCHANGE);
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].event_type, EVENT_ROOM_CREATED);

        // Live index and member set were seeded
        let live = h.store.set_members(keys::ROOMS_LIVE).await.unwrap();
        assert_eq!(live, vec![room.id.to_string()]);
        assert_eq!(
            h.store
                .set_len(&keys::room_members_key(room.id))
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_couple_room_skips_sequence_and_names() {
        let h = harness();
        let mut event = group_match(&[("a", Gender::Male), ("b", Gender::Female)]);
        event.kind = RoomKind::Couple;

        let room = h.manager.create_room(event).await.unwrap();
        assert_eq!(room.seq, None);
        assert!(room.members.iter().all(|m| m.display_name.is_none()));
        assert_eq!(
            h.publisher.published_to(COUPLE_ROOM_CREATE_EXCHANGE).len(),
            1
        );
    }

    #[tokio::test]
    async fn test_group_sequence_is_monotonic() {
        let h = harness();
        let first = h
            .manager
            .create_room(group_match(&[("m1", Gender::Male), ("f1", Gender::Female)]))
            .await
            .unwrap();
        let second = h
            .manager
            .create_room(group_match(&[("m2", Gender::Male), ("f2", Gender::Female)]))
            .await
            .unwrap();
        assert_eq!(first.seq, Some(1));
        assert_eq!(second.seq, Some(2));
    }

    #[tokio::test]
    async fn test_sweep_promotes_only_expired_rooms() {
        let h = harness();
        let room = h
            .manager
            .create_room(group_match(&[("m1", Gender::Male), ("f1", Gender::Female)]))
            .await
            .unwrap();

        // Deadline still live: nothing happens
        assert_eq!(h.manager.sweep_chat_once().await.unwrap(), 0);

        h.store.expire_now(&keys::room_deadline_key(room.id)).await;
        assert_eq!(h.manager.sweep_chat_once().await.unwrap(), 1);

        let updated = h.rooms.get(room.id).await.unwrap().unwrap();
        assert_eq!(updated.status, RoomStatus::ChoicePending);
        assert!(updated.choice_ends_at.is_some());

        // Moved from the live index to the choice index
        assert!(h.store.set_members(keys::ROOMS_LIVE).await.unwrap().is_empty());
        assert_eq!(
            h.store.set_members(keys::ROOMS_CHOICE).await.unwrap(),
            vec![room.id.to_string()]
        );
    }

    #[tokio::test]
    async fn test_promote_is_idempotent() {
        let h = harness();
        let room = h
            .manager
            .create_room(group_match(&[("m1", Gender::Male), ("f1", Gender::Female)]))
            .await
            .unwrap();

        assert!(h.manager.promote_room(room.id).await.unwrap());
        assert!(!h.manager.promote_room(room.id).await.unwrap());

        // Exactly one timeout event despite the second attempt
        assert_eq!(h.publisher.count_of(EVENT_ROOM_TIMEOUT), 1);
    }

    #[tokio::test]
    async fn test_promotion_notifies_each_member() {
        let h = harness();
        let room = h
            .manager
            .create_room(group_match(&[("m1", Gender::Male), ("f1", Gender::Female)]))
            .await
            .unwrap();

        h.manager.promote_room(room.id).await.unwrap();

        let notices = h.publisher.published_to(RK_FINAL_CHOICE_TIMEOUT);
        let mut notified: Vec<String> = notices
            .iter()
            .filter(|e| e.event_type == EVENT_FINAL_CHOICE_TIMEOUT)
            .map(|e| e.decode::<ChoiceStartNotice>().unwrap().user_id)
            .collect();
        notified.sort();
        assert_eq!(notified, vec!["f1".to_string(), "m1".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_promotion_restores_live_index() {
        let h = harness();

        // Index entry with no durable record behind it
        let orphan = generate_match_id();
        h.store
            .set_add(keys::ROOMS_LIVE, &orphan.to_string())
            .await
            .unwrap();

        assert!(h.manager.promote_room(orphan).await.is_err());

        // The entry survives, so a later pass can retry
        assert_eq!(
            h.store.set_members(keys::ROOMS_LIVE).await.unwrap(),
            vec![orphan.to_string()]
        );
        assert_eq!(h.publisher.count_of(EVENT_ROOM_TIMEOUT), 0);
    }

    #[tokio::test]
    async fn test_peer_manager_promotes_rooms_it_did_not_create() {
        let h = harness();
        let room = h
            .manager
            .create_room(group_match(&[("m1", Gender::Male), ("f1", Gender::Female)]))
            .await
            .unwrap();

        // A second manager over the same shared state, as on another process
        let peer_aggregator = Arc::new(FinalChoiceAggregator::new(
            h.store.clone(),
            h.rooms.clone(),
            h.publisher.clone(),
            Duration::from_millis(10),
            Arc::new(MetricsCollector::new().unwrap()),
        ));
        let peer = RoomLifecycleManager::new(
            h.store.clone(),
            h.rooms.clone(),
            h.publisher.clone(),
            peer_aggregator,
            RoomTimings::default(),
            Arc::new(MetricsCollector::new().unwrap()),
        );

        h.store.expire_now(&keys::room_deadline_key(room.id)).await;
        assert_eq!(peer.sweep_chat_once().await.unwrap(), 1);

        let updated = h.rooms.get(room.id).await.unwrap().unwrap();
        assert_eq!(updated.status, RoomStatus::ChoicePending);
    }

    #[tokio::test]
    async fn test_timeout_reports_absent_members() {
        let h = harness();
        let room = h
            .manager
            .create_room(group_match(&[("m1", Gender::Male), ("f1", Gender::Female)]))
            .await
            .unwrap();

        // Only m1 holds an open connection somewhere in the fleet
        h.store
            .hash_set(keys::ACTIVE_CLIENTS, "m1", "proc-1")
            .await
            .unwrap();

        h.manager.promote_room(room.id).await.unwrap();

        let events = h.publisher.published_to(RK_ROOM_TIMEOUT);
        assert_eq!(events.len(), 1);
        let timeout: RoomTimeout = events[0].decode().unwrap();
        assert_eq!(timeout.inactive, vec!["f1".to_string()]);
    }

    #[tokio::test]
    async fn test_all_ready_signals_promote_early() {
        let h = harness();
        let room = h
            .manager
            .create_room(group_match(&[("m1", Gender::Male), ("f1", Gender::Female)]))
            .await
            .unwrap();

        assert!(!h
            .manager
            .signal_ready(room.id, &"m1".to_string())
            .await
            .unwrap());
        assert!(h
            .manager
            .signal_ready(room.id, &"f1".to_string())
            .await
            .unwrap());

        let updated = h.rooms.get(room.id).await.unwrap().unwrap();
        assert_eq!(updated.status, RoomStatus::ChoicePending);
    }

    #[tokio::test]
    async fn test_remove_member_keeps_status() {
        let h = harness();
        let room = h
            .manager
            .create_room(group_match(&[("m1", Gender::Male), ("f1", Gender::Female)]))
            .await
            .unwrap();

        h.manager
            .remove_member(room.id, &"m1".to_string())
            .await
            .unwrap();

        let updated = h.rooms.get(room.id).await.unwrap().unwrap();
        assert_eq!(updated.status, RoomStatus::Chatting);
        assert_eq!(updated.members.len(), 1);
        assert_eq!(
            h.store
                .set_len(&keys::room_members_key(room.id))
                .await
                .unwrap(),
            1
        );
    }
}
