//! Final-choice aggregator
//!
//! Votes live in a per-room hash in the shared store, keyed by voter. A vote
//! is the chosen member's user id, or the empty string for an explicit skip.
//! Finalization runs at most once per room: whichever caller removes the room
//! from the choice index performs it, whether that is the quorum path or the
//! deadline sweep.

use crate::amqp::messages::{EventEnvelope, EVENT_FINAL_CHOICE_RESULT, RK_FINAL_CHOICE_TIMEOUT};
use crate::amqp::publisher::EventPublisher;
use crate::error::{MatchingError, Result};
use crate::metrics::MetricsCollector;
use crate::room::store::RoomStore;
use crate::store::{keys, SharedStore};
use crate::types::{ChoiceOutcome, MatchEvent, PublicProfile, Room, RoomId, RoomKind, RoomStatus, UserId};
use crate::utils::{current_timestamp, generate_match_id};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Vote value recorded for an explicit skip
pub const SKIP_VOTE: &str = "";

/// The final-choice aggregator
pub struct FinalChoiceAggregator {
    store: Arc<dyn SharedStore>,
    rooms: Arc<dyn RoomStore>,
    publisher: Arc<dyn EventPublisher>,
    cleanup_grace: Duration,
    metrics: Arc<MetricsCollector>,
}

impl FinalChoiceAggregator {
    pub fn new(
        store: Arc<dyn SharedStore>,
        rooms: Arc<dyn RoomStore>,
        publisher: Arc<dyn EventPublisher>,
        cleanup_grace: Duration,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store,
            rooms,
            publisher,
            cleanup_grace,
            metrics,
        }
    }

    /// Record one member's pick, finalizing the room if this completes the set
    ///
    /// A resubmission overwrites the previous vote without changing the vote
    /// count. Returns the outcome when this vote triggered finalization.
    pub async fn submit_choice(
        self: &Arc<Self>,
        room_id: RoomId,
        user_id: &UserId,
        target: Option<&UserId>,
    ) -> Result<Option<ChoiceOutcome>> {
        let room = self
            .rooms
            .get(room_id)
            .await?
            .ok_or_else(|| MatchingError::RoomNotFound {
                room_id: room_id.to_string(),
            })?;
        if room.status != RoomStatus::ChoicePending {
            return Err(MatchingError::InvalidTransition {
                from: room.status.to_string(),
                to: RoomStatus::ChoiceComplete.to_string(),
            }
            .into());
        }
        if room.member(user_id).is_none() {
            return Err(MatchingError::InvalidFrame {
                reason: format!("User '{}' is not a member of room {}", user_id, room_id),
            }
            .into());
        }
        if let Some(target) = target {
            if target == user_id || room.member(target).is_none() {
                return Err(MatchingError::InvalidFrame {
                    reason: format!("Invalid choice target '{}' in room {}", target, room_id),
                }
                .into());
            }
        }

        let vote = target.map(String::as_str).unwrap_or(SKIP_VOTE);
        self.store
            .hash_set(&keys::room_choice_key(room_id), user_id, vote)
            .await?;

        let votes = self.store.hash_len(&keys::room_choice_key(room_id)).await?;
        let members = self.store.set_len(&keys::room_members_key(room_id)).await?;
        debug!(
            "Choice recorded - room_id: {}, user_id: '{}', votes: {}/{}",
            room_id, user_id, votes, members
        );

        if members > 0 && votes >= members {
            return self.finalize_room(room_id).await;
        }
        Ok(None)
    }

    /// Resolve a room's votes into couples and publish the results
    ///
    /// Gated on removing the room from the choice index; a losing caller gets
    /// `Ok(None)`. Works with whatever votes exist, so the deadline sweep can
    /// call it for rooms that never reached quorum.
    pub async fn finalize_room(self: &Arc<Self>, room_id: RoomId) -> Result<Option<ChoiceOutcome>> {
        if !self
            .store
            .set_remove(keys::ROOMS_CHOICE, &room_id.to_string())
            .await?
        {
            debug!("Room {} already finalized; skipping", room_id);
            return Ok(None);
        }

        let votes = self.store.hash_get_all(&keys::room_choice_key(room_id)).await?;
        let room = self.rooms.advance_status(room_id, RoomStatus::ChoiceComplete).await?;
        let couples = mutual_pairs(&votes);

        info!(
            "Room finalized - room_id: {}, votes: {}, couples: {}",
            room_id,
            votes.len(),
            couples.len()
        );

        for (a, b) in &couples {
            self.publish_couple_match(&room, a, b).await?;
        }

        let outcome = ChoiceOutcome {
            room_id,
            couples,
            timestamp: current_timestamp(),
        };
        self.publisher
            .publish_app_event(
                RK_FINAL_CHOICE_TIMEOUT,
                EventEnvelope::new(EVENT_FINAL_CHOICE_RESULT, &outcome)?,
            )
            .await?;

        self.store.delete(&keys::room_choice_key(room_id)).await?;
        self.metrics.record_room_finalized(outcome.couples.len());
        self.schedule_cleanup(room_id);
        Ok(Some(outcome))
    }

    /// Feed a mutual pair back through the bus as a couple match
    async fn publish_couple_match(&self, room: &Room, a: &UserId, b: &UserId) -> Result<()> {
        let users: Vec<PublicProfile> = [a, b]
            .iter()
            .filter_map(|id| room.member(id))
            .map(|member| PublicProfile {
                user_id: member.user_id.clone(),
                gender: member.gender,
            })
            .collect();
        if users.len() != 2 {
            warn!(
                "Skipping couple with missing member record - room_id: {}, pair: ('{}', '{}')",
                room.id, a, b
            );
            return Ok(());
        }

        let event = MatchEvent {
            match_id: generate_match_id(),
            kind: RoomKind::Couple,
            users,
            timestamp: current_timestamp(),
        };
        info!(
            "Publishing couple match - room_id: {}, match_id: {}, pair: ('{}', '{}')",
            room.id, event.match_id, a, b
        );
        self.publisher.publish_match_event(event).await
    }

    /// Tear the room's ephemeral and durable state down after a grace delay
    ///
    /// The delay lets slow readers observe the final state before the keys
    /// disappear. Failures are logged and abandoned; every key has served its
    /// purpose by now.
    fn schedule_cleanup(self: &Arc<Self>, room_id: RoomId) {
        let aggregator = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(aggregator.cleanup_grace).await;
            aggregator.cleanup_room(room_id).await;
        });
    }

    /// Delete every key the room owned and close the durable record
    pub async fn cleanup_room(&self, room_id: RoomId) {
        for key in [
            keys::room_members_key(room_id),
            keys::room_joined_key(room_id),
            keys::room_ready_key(room_id),
            keys::room_deadline_key(room_id),
            keys::room_choice_key(room_id),
        ] {
            if let Err(e) = self.store.delete(&key).await {
                warn!("Failed to delete room key '{}': {}", key, e);
            }
        }

        if let Err(e) = self.rooms.advance_status(room_id, RoomStatus::Closed).await {
            warn!("Failed to close room {}: {}", room_id, e);
        }
        match self.rooms.delete(room_id).await {
            Ok(_) => info!("Room cleaned up - room_id: {}", room_id),
            Err(e) => warn!("Failed to delete room record {}: {}", room_id, e),
        }
    }
}

/// Extract user-id pairs that voted for each other
///
/// Each pair appears once, smaller id first, and the result is sorted so
/// concurrent finalizers would report identical outcomes.
pub fn mutual_pairs(votes: &HashMap<String, String>) -> Vec<(UserId, UserId)> {
    let mut couples: Vec<(UserId, UserId)> = votes
        .iter()
        .filter(|(voter, target)| {
            !target.is_empty()
                && voter.as_str() < target.as_str()
                && votes.get(*target).map(String::as_str) == Some(voter.as_str())
        })
        .map(|(voter, target)| (voter.clone(), target.clone()))
        .collect();
    couples.sort();
    couples
}
