//! AMQP consumers bridging bus events into the service
//!
//! Two consumer shapes exist: the match consumer feeds `MatchEvent`s into the
//! room lifecycle manager, and the app-event consumer feeds routed events into
//! the presence registry for socket fan-out. Fan-out aimed at sockets binds a
//! broker-named queue per process; match consumption binds one shared durable
//! queue the whole fleet competes on, so each match is consumed once.

use crate::amqp::messages::EventEnvelope;
use crate::error::{MatchingError, Result};
use crate::types::MatchEvent;
use amqprs::{
    channel::{
        BasicCancelArguments, BasicConsumeArguments, Channel, QueueBindArguments,
        QueueDeclareArguments,
    },
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Handler for completed-match announcements
#[async_trait]
pub trait MatchEventHandler: Send + Sync {
    /// Consume one match event; a returned error is logged and the event dropped
    async fn handle_match_event(&self, event: MatchEvent) -> Result<()>;
}

/// Handler for routed app events and room-create fan-outs
#[async_trait]
pub trait AppEventHandler: Send + Sync {
    /// Consume one envelope delivered with the given routing key
    async fn handle_app_event(&self, routing_key: &str, envelope: EventEnvelope) -> Result<()>;
}

/// Declare a broker-named, auto-delete queue bound to an exchange
///
/// Returns the generated queue name. For fan-out exchanges the routing key is
/// ignored by the broker; pass `&[""]`.
pub async fn bind_process_queue(
    channel: &Channel,
    exchange: &str,
    routing_keys: &[&str],
) -> Result<String> {
    let declare_args = QueueDeclareArguments::default()
        .exclusive(true)
        .auto_delete(true)
        .finish();

    let (queue_name, _, _) = channel
        .queue_declare(declare_args)
        .await
        .map_err(|e| MatchingError::AmqpConnectionFailed {
            message: format!("Failed to declare consumer queue: {}", e),
        })?
        .ok_or_else(|| MatchingError::AmqpConnectionFailed {
            message: "Broker did not return a queue name".to_string(),
        })?;

    for routing_key in routing_keys {
        channel
            .queue_bind(QueueBindArguments::new(&queue_name, exchange, routing_key))
            .await
            .map_err(|e| MatchingError::AmqpConnectionFailed {
                message: format!(
                    "Failed to bind queue {} to {} ({}): {}",
                    queue_name, exchange, routing_key, e
                ),
            })?;
    }

    debug!(
        "Bound process queue '{}' to exchange '{}' with {} routing key(s)",
        queue_name,
        exchange,
        routing_keys.len()
    );
    Ok(queue_name)
}

/// Declare a named durable queue bound to an exchange
///
/// Every process declares the same queue, so the broker load-balances
/// deliveries across the fleet instead of copying them to each process.
pub async fn bind_shared_queue(channel: &Channel, queue_name: &str, exchange: &str) -> Result<()> {
    let declare_args = QueueDeclareArguments::new(queue_name)
        .durable(true)
        .finish();

    channel
        .queue_declare(declare_args)
        .await
        .map_err(|e| MatchingError::AmqpConnectionFailed {
            message: format!("Failed to declare shared queue {}: {}", queue_name, e),
        })?;

    channel
        .queue_bind(QueueBindArguments::new(queue_name, exchange, ""))
        .await
        .map_err(|e| MatchingError::AmqpConnectionFailed {
            message: format!(
                "Failed to bind shared queue {} to {}: {}",
                queue_name, exchange, e
            ),
        })?;

    debug!(
        "Bound shared queue '{}' to exchange '{}'",
        queue_name, exchange
    );
    Ok(())
}

/// Consumer wrapper that owns its tag and can stop consuming
pub struct EventConsumer {
    channel: Channel,
    consumer_tag: String,
}

impl EventConsumer {
    /// Start consuming match events from a queue
    pub async fn start_match_consumer(
        channel: Channel,
        queue_name: &str,
        handler: Arc<dyn MatchEventHandler>,
    ) -> Result<Self> {
        let consumer_tag = format!("match-consumer-{}", uuid::Uuid::new_v4());
        let args = BasicConsumeArguments::new(queue_name, &consumer_tag)
            .auto_ack(true)
            .finish();

        channel
            .basic_consume(MatchConsumer { handler }, args)
            .await
            .map_err(|e| MatchingError::AmqpConnectionFailed {
                message: format!("Failed to start match consumer: {}", e),
            })?;

        info!("Started consuming match events from queue: {}", queue_name);
        Ok(Self {
            channel,
            consumer_tag,
        })
    }

    /// Start consuming routed app events from a queue
    pub async fn start_app_event_consumer(
        channel: Channel,
        queue_name: &str,
        handler: Arc<dyn AppEventHandler>,
    ) -> Result<Self> {
        let consumer_tag = format!("app-event-consumer-{}", uuid::Uuid::new_v4());
        let args = BasicConsumeArguments::new(queue_name, &consumer_tag)
            .auto_ack(true)
            .finish();

        channel
            .basic_consume(AppEventConsumer { handler }, args)
            .await
            .map_err(|e| MatchingError::AmqpConnectionFailed {
                message: format!("Failed to start app event consumer: {}", e),
            })?;

        info!("Started consuming app events from queue: {}", queue_name);
        Ok(Self {
            channel,
            consumer_tag,
        })
    }

    /// Stop consuming messages
    pub async fn stop(&self) -> Result<()> {
        let args = BasicCancelArguments::new(&self.consumer_tag);

        self.channel.basic_cancel(args).await.map_err(|e| {
            MatchingError::AmqpConnectionFailed {
                message: format!("Failed to stop consuming: {}", e),
            }
        })?;

        info!("Stopped consumer {}", self.consumer_tag);
        Ok(())
    }
}

/// Internal consumer for the match fan-out
struct MatchConsumer {
    handler: Arc<dyn MatchEventHandler>,
}

#[async_trait]
impl AsyncConsumer for MatchConsumer {
    async fn consume(
        &mut self,
        _channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();
        debug!(
            "Match event received - delivery_tag: {}, size: {} bytes",
            delivery_tag,
            content.len()
        );

        let event = match EventEnvelope::from_bytes(&content)
            .and_then(|envelope| envelope.decode::<MatchEvent>())
        {
            Ok(event) => event,
            Err(e) => {
                // Malformed input: log and drop the single message
                warn!(
                    "Dropping malformed match event - delivery_tag: {}, error: {}",
                    delivery_tag, e
                );
                return;
            }
        };

        info!(
            "Match event parsed - match_id: {}, kind: {}, users: {}",
            event.match_id,
            event.kind,
            event.users.len()
        );

        if let Err(e) = self.handler.handle_match_event(event).await {
            error!(
                "Match event processing failed - delivery_tag: {}, error: {}",
                delivery_tag, e
            );
        }
    }
}

/// Internal consumer for the app events topic and room-create fan-outs
struct AppEventConsumer {
    handler: Arc<dyn AppEventHandler>,
}

#[async_trait]
impl AsyncConsumer for AppEventConsumer {
    async fn consume(
        &mut self,
        _channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let routing_key = deliver.routing_key().to_string();

        let envelope = match EventEnvelope::from_bytes(&content) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    "Dropping malformed app event - routing_key: '{}', error: {}",
                    routing_key, e
                );
                return;
            }
        };

        debug!(
            "App event received - routing_key: '{}', event_type: '{}'",
            routing_key, envelope.event_type
        );

        if let Err(e) = self.handler.handle_app_event(&routing_key, envelope).await {
            error!(
                "App event processing failed - routing_key: '{}', error: {}",
                routing_key, e
            );
        }
    }
}

/// Mock match handler for testing
pub struct MockMatchHandler {
    pub received: Arc<tokio::sync::Mutex<Vec<MatchEvent>>>,
}

impl Default for MockMatchHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMatchHandler {
    pub fn new() -> Self {
        Self {
            received: Arc::new(tokio::sync::Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl MatchEventHandler for MockMatchHandler {
    async fn handle_match_event(&self, event: MatchEvent) -> Result<()> {
        let mut received = self.received.lock().await;
        received.push(event);
        Ok(())
    }
}
