//! WebSocket session handling
//!
//! One task pair per connection: the read half owns the session (frame
//! dispatch, ping schedule, liveness window), a dedicated writer task drains
//! the bounded outbound queue so fan-out never blocks on a slow socket.

use crate::amqp::messages::{
    EventEnvelope, EVENT_CHAT_LATEST, EVENT_CHAT_MESSAGE, EVENT_ROOM_JOIN, EVENT_ROOM_LEAVE,
    RK_CHAT, RK_CHAT_LATEST, RK_ROOM_JOIN, RK_ROOM_LEAVE,
};
use crate::amqp::publisher::EventPublisher;
use crate::choice::FinalChoiceAggregator;
use crate::config::PresenceSettings;
use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::presence::frames::{preview_of, ChatMessage, ChatPreview, InboundFrame, OutboundFrame, RoomMembership};
use crate::presence::registry::PresenceRegistry;
use crate::profile::ProfileProvider;
use crate::queue::MatchQueue;
use crate::room::manager::RoomLifecycleManager;
use crate::room::store::RoomStore;
use crate::store::{keys, SharedStore};
use crate::types::{RoomId, UserId, WaitingUser};
use crate::utils::current_timestamp;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant};
use tracing::{debug, info, warn};

/// Everything a socket session needs, shared across connections
pub struct SocketContext {
    pub registry: Arc<PresenceRegistry>,
    pub queue: Arc<MatchQueue>,
    pub manager: Arc<RoomLifecycleManager>,
    pub aggregator: Arc<FinalChoiceAggregator>,
    pub provider: Arc<dyn ProfileProvider>,
    pub publisher: Arc<dyn EventPublisher>,
    pub rooms: Arc<dyn RoomStore>,
    pub store: Arc<dyn SharedStore>,
    pub settings: PresenceSettings,
    pub metrics: Arc<MetricsCollector>,
}

/// Run one connection's full lifecycle
pub async fn handle_socket(ctx: Arc<SocketContext>, socket: WebSocket, user_id: UserId) {
    let (mut sink, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) =
        mpsc::channel::<OutboundFrame>(ctx.settings.outbound_queue_capacity);

    if let Err(e) = ctx.registry.register(&user_id, outbound_tx.clone()).await {
        warn!("Rejecting connection for '{}': {}", user_id, e);
        let _ = sink.send(Message::Close(None)).await;
        return;
    }

    // Dedicated writer task keeps outbound frames flowing even while we await
    // inbound ones. It ends when every sender clone is dropped.
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let text = match frame.to_text() {
                Ok(text) => text,
                Err(e) => {
                    warn!("Skipping unserializable outbound frame: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let waiting = enter_matching(&ctx, &user_id).await;

    let mut ping_ticker = interval(Duration::from_secs(ctx.settings.ping_interval_seconds));
    ping_ticker.tick().await; // first tick is immediate
    let pong_window = Duration::from_secs(ctx.settings.pong_window_seconds);
    let mut last_pong = Instant::now();

    loop {
        tokio::select! {
            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        match InboundFrame::parse(&text) {
                            Ok(InboundFrame::Pong) => {
                                last_pong = Instant::now();
                                ctx.metrics.record_frame_received("pong");
                            }
                            Ok(frame) => {
                                if let Err(e) = dispatch_frame(&ctx, &user_id, frame).await {
                                    warn!(
                                        "Frame dispatch failed - user_id: '{}', error: {}",
                                        user_id, e
                                    );
                                }
                            }
                            Err(e) => {
                                debug!(
                                    "Dropping malformed frame - user_id: '{}', error: {}",
                                    user_id, e
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary and protocol-level ping/pong
                    Some(Err(e)) => {
                        debug!("Socket receive error for '{}': {}", user_id, e);
                        break;
                    }
                }
            }
            _ = ping_ticker.tick() => {
                if last_pong.elapsed() > pong_window {
                    info!(
                        "Closing unresponsive connection - user_id: '{}', pong_window: {:?}",
                        user_id, pong_window
                    );
                    break;
                }
                if outbound_tx.send(OutboundFrame::Ping).await.is_err() {
                    break;
                }
            }
        }
    }

    leave_matching(&ctx, &user_id, waiting).await;
    drop(outbound_tx);
    let _ = writer_task.await;
    info!("Connection closed - user_id: '{}'", user_id);
}

/// Resolve the profile and join the matching queue
///
/// Enqueue failures are survivable: an already-queued reconnect keeps its
/// existing queue slot, and a user mid-room has no business queueing anyway.
async fn enter_matching(ctx: &Arc<SocketContext>, user_id: &UserId) -> Option<WaitingUser> {
    let profile = match ctx.provider.waiting_profile(user_id).await {
        Ok(profile) => profile,
        Err(e) => {
            warn!("Profile lookup failed for '{}': {}", user_id, e);
            return None;
        }
    };

    match ctx.queue.enqueue(&profile).await {
        Ok(()) => {
            ctx.metrics.record_enqueue(profile.gender);
            Some(profile)
        }
        Err(e) => {
            info!("Skipping enqueue for '{}': {}", user_id, e);
            Some(profile)
        }
    }
}

/// Release the queue slot and the presence claim on disconnect
async fn leave_matching(ctx: &Arc<SocketContext>, user_id: &UserId, waiting: Option<WaitingUser>) {
    if let Some(profile) = waiting {
        match ctx.queue.dequeue(&profile).await {
            Ok(true) => {
                ctx.metrics.record_dequeue(profile.gender);
                info!("Removed '{}' from the matching queue", user_id);
            }
            Ok(false) => {}
            Err(e) => warn!("Failed to dequeue '{}': {}", user_id, e),
        }
    }
    if let Err(e) = ctx.registry.unregister(user_id).await {
        warn!("Failed to release presence for '{}': {}", user_id, e);
    }
}

/// Apply one inbound frame
async fn dispatch_frame(
    ctx: &Arc<SocketContext>,
    user_id: &UserId,
    frame: InboundFrame,
) -> Result<()> {
    match frame {
        InboundFrame::Message { room_id, body } => {
            ctx.metrics.record_frame_received("message");
            publish_chat(ctx, user_id, room_id, body).await
        }
        InboundFrame::Join { room_id } => {
            ctx.metrics.record_frame_received("join");
            ctx.store
                .set_add(&keys::room_joined_key(room_id), user_id)
                .await?;
            let membership = RoomMembership {
                room_id,
                user_id: user_id.clone(),
                timestamp: current_timestamp(),
            };
            ctx.publisher
                .publish_app_event(RK_ROOM_JOIN, EventEnvelope::new(EVENT_ROOM_JOIN, &membership)?)
                .await
        }
        InboundFrame::Leave { room_id } => {
            ctx.metrics.record_frame_received("leave");
            ctx.store
                .set_remove(&keys::room_joined_key(room_id), user_id)
                .await?;
            let membership = RoomMembership {
                room_id,
                user_id: user_id.clone(),
                timestamp: current_timestamp(),
            };
            ctx.publisher
                .publish_app_event(
                    RK_ROOM_LEAVE,
                    EventEnvelope::new(EVENT_ROOM_LEAVE, &membership)?,
                )
                .await?;
            // A full set of leave signals ends the chat phase early
            ctx.manager.signal_ready(room_id, user_id).await?;
            Ok(())
        }
        InboundFrame::FinalChoice { room_id, target } => {
            ctx.metrics.record_frame_received("final_choice");
            ctx.aggregator
                .submit_choice(room_id, user_id, target.as_ref())
                .await?;
            Ok(())
        }
        InboundFrame::Pong => Ok(()), // handled in the read loop
    }
}

/// Publish a chat message and its list preview onto the app-events topic
async fn publish_chat(
    ctx: &Arc<SocketContext>,
    user_id: &UserId,
    room_id: RoomId,
    body: String,
) -> Result<()> {
    let display_name = match ctx.rooms.get(room_id).await? {
        Some(room) => room.member(user_id).and_then(|m| m.display_name.clone()),
        None => None,
    };
    let timestamp = current_timestamp();

    let message = ChatMessage {
        room_id,
        sender_id: user_id.clone(),
        display_name,
        body: body.clone(),
        timestamp,
    };
    ctx.publisher
        .publish_app_event(RK_CHAT, EventEnvelope::new(EVENT_CHAT_MESSAGE, &message)?)
        .await?;

    let preview = ChatPreview {
        room_id,
        preview: preview_of(&body),
        timestamp,
    };
    ctx.publisher
        .publish_app_event(RK_CHAT_LATEST, EventEnvelope::new(EVENT_CHAT_LATEST, &preview)?)
        .await
}
