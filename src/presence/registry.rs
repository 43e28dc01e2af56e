//! Process-local presence registry
//!
//! Tracks which users hold a socket on this process and claims each user in
//! the fleet-wide `client:active` hash. Fan-out from the bus lands here: the
//! registry is the app-event handler that turns bus events into outbound
//! frames for locally connected members.

use crate::amqp::handlers::AppEventHandler;
use crate::amqp::messages::{
    EventEnvelope, EVENT_FINAL_CHOICE_RESULT, EVENT_FINAL_CHOICE_TIMEOUT, RK_CHAT, RK_CHAT_LATEST,
    RK_FINAL_CHOICE_TIMEOUT, RK_ROOM_TIMEOUT,
};
use crate::error::{MatchingError, Result};
use crate::metrics::MetricsCollector;
use crate::presence::frames::{ChatMessage, ChatPreview, OutboundFrame};
use crate::store::{keys, SharedStore};
use crate::types::{ChoiceOutcome, ChoiceStartNotice, RoomId, RoomTimeout, UserId};
use crate::utils::seconds_until;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// The presence registry
pub struct PresenceRegistry {
    /// Identity recorded in `client:active` for connections held here
    process_id: String,
    store: Arc<dyn SharedStore>,
    connections: DashMap<UserId, mpsc::Sender<OutboundFrame>>,
    send_timeout: Duration,
    metrics: Arc<MetricsCollector>,
}

impl PresenceRegistry {
    pub fn new(
        process_id: String,
        store: Arc<dyn SharedStore>,
        send_timeout: Duration,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            process_id,
            store,
            connections: DashMap::new(),
            send_timeout,
            metrics,
        }
    }

    /// Claim a user's presence and record their outbound channel
    ///
    /// The `client:active` claim is fleet-wide. A claim already held by this
    /// process means a stale entry from a dropped socket and is taken over;
    /// a claim held elsewhere is a genuine conflict.
    pub async fn register(
        &self,
        user_id: &UserId,
        sender: mpsc::Sender<OutboundFrame>,
    ) -> Result<()> {
        let claimed = self
            .store
            .hash_set_nx(keys::ACTIVE_CLIENTS, user_id, &self.process_id)
            .await?;
        if !claimed {
            let owner = self.store.hash_get(keys::ACTIVE_CLIENTS, user_id).await?;
            if owner.as_deref() != Some(self.process_id.as_str()) {
                return Err(MatchingError::PresenceConflict {
                    user_id: user_id.clone(),
                }
                .into());
            }
            debug!("Taking over stale presence claim for '{}'", user_id);
        }

        self.connections.insert(user_id.clone(), sender);
        self.metrics.record_connection_opened(self.connections.len());
        info!(
            "Presence registered - user_id: '{}', process_id: {}, local_connections: {}",
            user_id,
            self.process_id,
            self.connections.len()
        );
        Ok(())
    }

    /// Release a user's presence claim and local channel
    ///
    /// Only removes the fleet-wide claim when this process still owns it, so
    /// a user who reconnected elsewhere keeps their new claim.
    pub async fn unregister(&self, user_id: &UserId) -> Result<()> {
        self.connections.remove(user_id);
        let owner = self.store.hash_get(keys::ACTIVE_CLIENTS, user_id).await?;
        if owner.as_deref() == Some(self.process_id.as_str()) {
            self.store.hash_remove(keys::ACTIVE_CLIENTS, user_id).await?;
        }
        self.metrics.record_connection_closed(self.connections.len());
        info!(
            "Presence released - user_id: '{}', local_connections: {}",
            user_id,
            self.connections.len()
        );
        Ok(())
    }

    /// Whether a user holds a socket on this process
    pub fn is_local(&self, user_id: &UserId) -> bool {
        self.connections.contains_key(user_id)
    }

    /// Number of sockets held on this process
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Deliver a frame to a locally connected user
    ///
    /// A full queue that stays full past the send timeout marks the socket as
    /// stalled: the connection is dropped rather than letting one slow reader
    /// hold up room fan-out.
    pub async fn route_to_user(&self, user_id: &UserId, frame: OutboundFrame) -> bool {
        let sender = match self.connections.get(user_id) {
            Some(entry) => entry.value().clone(),
            None => return false,
        };

        match timeout(self.send_timeout, sender.send(frame)).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                // Writer task is gone; the read half will clean up shortly
                self.connections.remove(user_id);
                false
            }
            Err(_) => {
                warn!(
                    "Dropping stalled connection - user_id: '{}', send_timeout: {:?}",
                    user_id, self.send_timeout
                );
                self.connections.remove(user_id);
                self.metrics.record_frame_dropped();
                false
            }
        }
    }

    /// Fan a frame out to every joined room member connected to this process
    ///
    /// Targets the joined set, so a member who sent a leave frame stops
    /// receiving room traffic even while they remain a member. Peers hold
    /// members connected elsewhere; each process delivers to its own sockets
    /// off the shared bus. Returns the local delivery count.
    pub async fn route_to_room(&self, room_id: RoomId, frame: OutboundFrame) -> Result<usize> {
        let members = self
            .store
            .set_members(&keys::room_joined_key(room_id))
            .await?;
        let mut delivered = 0;
        for member in members {
            if self.route_to_user(&member, frame.clone()).await {
                delivered += 1;
            }
        }
        Ok(delivered)
    }
}

#[async_trait]
impl AppEventHandler for PresenceRegistry {
    async fn handle_app_event(&self, routing_key: &str, envelope: EventEnvelope) -> Result<()> {
        match routing_key {
            RK_CHAT => {
                let message: ChatMessage = envelope.decode()?;
                let sender = message
                    .display_name
                    .unwrap_or_else(|| message.sender_id.clone());
                self.route_to_room(
                    message.room_id,
                    OutboundFrame::Chat {
                        room_id: message.room_id,
                        sender,
                        body: message.body,
                        timestamp: message.timestamp,
                    },
                )
                .await?;
            }
            RK_CHAT_LATEST => {
                let preview: ChatPreview = envelope.decode()?;
                self.route_to_room(
                    preview.room_id,
                    OutboundFrame::ChatLatest {
                        room_id: preview.room_id,
                        preview: preview.preview,
                        timestamp: preview.timestamp,
                    },
                )
                .await?;
            }
            RK_ROOM_TIMEOUT => {
                let event: RoomTimeout = envelope.decode()?;
                self.route_to_room(
                    event.room_id,
                    OutboundFrame::RoomTimeout {
                        room_id: event.room_id,
                        inactive: event.inactive,
                        choice_ends_at: event.choice_ends_at,
                    },
                )
                .await?;
            }
            RK_FINAL_CHOICE_TIMEOUT if envelope.event_type == EVENT_FINAL_CHOICE_TIMEOUT => {
                let notice: ChoiceStartNotice = envelope.decode()?;
                self.route_to_user(
                    &notice.user_id,
                    OutboundFrame::FinalChoiceStart {
                        room_id: notice.room_id,
                        choice_ends_at: notice.choice_ends_at,
                        seconds_left: seconds_until(notice.choice_ends_at),
                    },
                )
                .await;
            }
            RK_FINAL_CHOICE_TIMEOUT if envelope.event_type == EVENT_FINAL_CHOICE_RESULT => {
                let outcome: ChoiceOutcome = envelope.decode()?;
                self.route_to_room(
                    outcome.room_id,
                    OutboundFrame::FinalChoiceResult {
                        room_id: outcome.room_id,
                        couples: outcome.couples,
                    },
                )
                .await?;
            }
            // room.join / room.leave feed downstream collaborators
            other => {
                debug!(
                    "Ignoring app event - routing_key: {}, event_type: {}",
                    other, envelope.event_type
                );
            }
        }
        Ok(())
    }
}
