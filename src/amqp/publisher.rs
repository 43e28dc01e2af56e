//! AMQP event publisher for outbound events

use crate::amqp::messages::{
    EventEnvelope, APP_EVENTS_EXCHANGE, COUPLE_ROOM_CREATE_EXCHANGE, EVENT_COUPLE_ROOM_CREATED,
    EVENT_MATCH, EVENT_ROOM_CREATED, MATCH_EVENTS_EXCHANGE, ROOM_CREATE_EXCHANGE,
};
use crate::error::{MatchingError, Result};
use crate::types::{MatchEvent, RoomCreated};
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Trait for publishing matchmaking and room events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a completed-match announcement on the match fan-out
    async fn publish_match_event(&self, event: MatchEvent) -> Result<()>;

    /// Publish a group room creation on its fan-out
    async fn publish_room_created(&self, event: RoomCreated) -> Result<()>;

    /// Publish a couple room creation on its fan-out
    async fn publish_couple_room_created(&self, event: RoomCreated) -> Result<()>;

    /// Publish a routed event on the app events topic
    async fn publish_app_event(&self, routing_key: &str, envelope: EventEnvelope) -> Result<()>;
}

/// Configuration for event publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

/// AMQP-based event publisher implementation
pub struct AmqpEventPublisher {
    channel: Channel,
    config: PublisherConfig,
}

impl AmqpEventPublisher {
    /// Create a new event publisher and declare its exchanges
    pub async fn new(channel: Channel, config: PublisherConfig) -> Result<Self> {
        let publisher = Self { channel, config };
        publisher.setup_exchanges().await?;
        Ok(publisher)
    }

    /// Declare all exchanges this service publishes to
    async fn setup_exchanges(&self) -> Result<()> {
        let declarations = [
            (APP_EVENTS_EXCHANGE, "topic"),
            (ROOM_CREATE_EXCHANGE, "fanout"),
            (COUPLE_ROOM_CREATE_EXCHANGE, "fanout"),
            (MATCH_EVENTS_EXCHANGE, "fanout"),
        ];

        for (exchange, kind) in declarations {
            let args = ExchangeDeclareArguments::new(exchange, kind);
            self.channel.exchange_declare(args).await.map_err(|e| {
                MatchingError::AmqpConnectionFailed {
                    message: format!("Failed to declare exchange {}: {}", exchange, e),
                }
            })?;
        }

        info!("Successfully set up AMQP exchanges");
        Ok(())
    }

    /// Publish to an exchange with retry logic
    async fn publish_to_exchange(
        &self,
        exchange: &str,
        routing_key: &str,
        envelope: &EventEnvelope,
    ) -> Result<()> {
        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(exchange, routing_key, envelope).await {
                Ok(_) => {
                    debug!(
                        "Published '{}' event to exchange {} (key '{}')",
                        envelope.event_type, exchange, routing_key
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish '{}' event after {} retries: {}",
                            envelope.event_type, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for '{}' event: {}. Retrying in {:?}",
                        retry_count, envelope.event_type, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    /// Single publish attempt
    async fn try_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        envelope: &EventEnvelope,
    ) -> Result<()> {
        let payload = envelope.to_bytes()?;

        let args = BasicPublishArguments::new(exchange, routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&uuid::Uuid::new_v4().to_string())
            .with_timestamp(chrono::Utc::now().timestamp() as u64)
            .with_content_type("application/json");

        self.channel
            .basic_publish(properties, payload, args)
            .await
            .map_err(|e| MatchingError::AmqpConnectionFailed {
                message: format!("Failed to publish message: {}", e),
            })?;

        Ok(())
    }
}

#[async_trait]
impl EventPublisher for AmqpEventPublisher {
    async fn publish_match_event(&self, event: MatchEvent) -> Result<()> {
        let envelope = EventEnvelope::new(EVENT_MATCH, &event)?;
        self.publish_to_exchange(MATCH_EVENTS_EXCHANGE, "", &envelope)
            .await
    }

    async fn publish_room_created(&self, event: RoomCreated) -> Result<()> {
        let envelope = EventEnvelope::new(EVENT_ROOM_CREATED, &event)?;
        self.publish_to_exchange(ROOM_CREATE_EXCHANGE, "", &envelope)
            .await
    }

    async fn publish_couple_room_created(&self, event: RoomCreated) -> Result<()> {
        let envelope = EventEnvelope::new(EVENT_COUPLE_ROOM_CREATED, &event)?;
        self.publish_to_exchange(COUPLE_ROOM_CREATE_EXCHANGE, "", &envelope)
            .await
    }

    async fn publish_app_event(&self, routing_key: &str, envelope: EventEnvelope) -> Result<()> {
        self.publish_to_exchange(APP_EVENTS_EXCHANGE, routing_key, &envelope)
            .await
    }
}

/// Mock event publisher for testing
#[derive(Debug, Default)]
pub struct MockEventPublisher {
    published: std::sync::Mutex<Vec<(String, EventEnvelope)>>,
}

impl MockEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All (destination, envelope) pairs published so far
    pub fn published(&self) -> Vec<(String, EventEnvelope)> {
        self.published
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Envelopes published to a given exchange or routing key
    pub fn published_to(&self, destination: &str) -> Vec<EventEnvelope> {
        self.published()
            .into_iter()
            .filter(|(dest, _)| dest == destination)
            .map(|(_, envelope)| envelope)
            .collect()
    }

    /// Number of published envelopes with the given event type
    pub fn count_of(&self, event_type: &str) -> usize {
        self.published()
            .iter()
            .filter(|(_, e)| e.event_type == event_type)
            .count()
    }

    /// Clear recorded events
    pub fn clear(&self) {
        if let Ok(mut events) = self.published.lock() {
            events.clear();
        }
    }

    fn record(&self, destination: &str, envelope: EventEnvelope) {
        if let Ok(mut events) = self.published.lock() {
            events.push((destination.to_string(), envelope));
        }
    }
}

#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn publish_match_event(&self, event: MatchEvent) -> Result<()> {
        self.record(MATCH_EVENTS_EXCHANGE, EventEnvelope::new(EVENT_MATCH, &event)?);
        Ok(())
    }

    async fn publish_room_created(&self, event: RoomCreated) -> Result<()> {
        self.record(
            ROOM_CREATE_EXCHANGE,
            EventEnvelope::new(EVENT_ROOM_CREATED, &event)?,
        );
        Ok(())
    }

    async fn publish_couple_room_created(&self, event: RoomCreated) -> Result<()> {
        self.record(
            COUPLE_ROOM_CREATE_EXCHANGE,
            EventEnvelope::new(EVENT_COUPLE_ROOM_CREATED, &event)?,
        );
        Ok(())
    }

    async fn publish_app_event(&self, routing_key: &str, envelope: EventEnvelope) -> Result<()> {
        self.record(routing_key, envelope);
        Ok(())
    }
}
