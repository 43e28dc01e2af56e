//! Metrics collection using Prometheus
//!
//! One collector per process, shared by every component via `Arc`. All
//! families live in a private registry so tests can build collectors freely
//! without default-registry name collisions.

use crate::types::{Gender, RoomKind};
use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Main metrics collector for the matching service
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,
    service_metrics: ServiceMetrics,
    queue_metrics: QueueMetrics,
    room_metrics: RoomMetrics,
    presence_metrics: PresenceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Total AMQP messages consumed, by exchange
    pub amqp_messages_total: IntCounterVec,
    /// AMQP handling errors, by exchange
    pub amqp_errors_total: IntCounterVec,
}

/// Matching-queue metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Total users enqueued, by gender
    pub enqueued_total: IntCounterVec,
    /// Total users dequeued before matching, by gender
    pub dequeued_total: IntCounterVec,
    /// Total matches formed, by party size
    pub matches_total: IntCounterVec,
}

/// Room lifecycle metrics
#[derive(Clone)]
pub struct RoomMetrics {
    /// Total rooms created, by kind
    pub rooms_created_total: IntCounterVec,
    /// Total chat phases expired into the choice phase
    pub room_timeouts_total: IntCounter,
    /// Total rooms finalized
    pub rooms_finalized_total: IntCounter,
    /// Total mutual couples produced
    pub couples_total: IntCounter,
}

/// Presence and socket metrics
#[derive(Clone)]
pub struct PresenceMetrics {
    /// Sockets currently held by this process
    pub connections_active: IntGauge,
    /// Inbound frames handled, by kind
    pub frames_received_total: IntCounterVec,
    /// Outbound frames abandoned on stalled connections
    pub frames_dropped_total: IntCounter,
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let amqp_messages_total = IntCounterVec::new(
            Opts::new("mingle_amqp_messages_total", "Total AMQP messages consumed"),
            &["exchange"],
        )?;
        let amqp_errors_total = IntCounterVec::new(
            Opts::new("mingle_amqp_errors_total", "AMQP message handling errors"),
            &["exchange"],
        )?;
        registry.register(Box::new(amqp_messages_total.clone()))?;
        registry.register(Box::new(amqp_errors_total.clone()))?;
        Ok(Self {
            amqp_messages_total,
            amqp_errors_total,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let enqueued_total = IntCounterVec::new(
            Opts::new("mingle_queue_enqueued_total", "Users enqueued for matching"),
            &["gender"],
        )?;
        let dequeued_total = IntCounterVec::new(
            Opts::new(
                "mingle_queue_dequeued_total",
                "Users removed from the queue before matching",
            ),
            &["gender"],
        )?;
        let matches_total = IntCounterVec::new(
            Opts::new("mingle_matches_total", "Matches formed"),
            &["party_size"],
        )?;
        registry.register(Box::new(enqueued_total.clone()))?;
        registry.register(Box::new(dequeued_total.clone()))?;
        registry.register(Box::new(matches_total.clone()))?;
        Ok(Self {
            enqueued_total,
            dequeued_total,
            matches_total,
        })
    }
}

impl RoomMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let rooms_created_total = IntCounterVec::new(
            Opts::new("mingle_rooms_created_total", "Rooms created"),
            &["kind"],
        )?;
        let room_timeouts_total = IntCounter::new(
            "mingle_room_timeouts_total",
            "Chat phases expired into the choice phase",
        )?;
        let rooms_finalized_total =
            IntCounter::new("mingle_rooms_finalized_total", "Rooms finalized")?;
        let couples_total = IntCounter::new("mingle_couples_total", "Mutual couples produced")?;
        registry.register(Box::new(rooms_created_total.clone()))?;
        registry.register(Box::new(room_timeouts_total.clone()))?;
        registry.register(Box::new(rooms_finalized_total.clone()))?;
        registry.register(Box::new(couples_total.clone()))?;
        Ok(Self {
            rooms_created_total,
            room_timeouts_total,
            rooms_finalized_total,
            couples_total,
        })
    }
}

impl PresenceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let connections_active = IntGauge::new(
            "mingle_connections_active",
            "Sockets currently held by this process",
        )?;
        let frames_received_total = IntCounterVec::new(
            Opts::new("mingle_frames_received_total", "Inbound frames handled"),
            &["kind"],
        )?;
        let frames_dropped_total = IntCounter::new(
            "mingle_frames_dropped_total",
            "Outbound frames abandoned on stalled connections",
        )?;
        registry.register(Box::new(connections_active.clone()))?;
        registry.register(Box::new(frames_received_total.clone()))?;
        registry.register(Box::new(frames_dropped_total.clone()))?;
        Ok(Self {
            connections_active,
            frames_received_total,
            frames_dropped_total,
        })
    }
}

impl MetricsCollector {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let room_metrics = RoomMetrics::new(&registry)?;
        let presence_metrics = PresenceMetrics::new(&registry)?;
        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            room_metrics,
            presence_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Render every family in the text exposition format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        Ok(encoder.encode_to_string(&self.registry.gather())?)
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn room(&self) -> &RoomMetrics {
        &self.room_metrics
    }

    pub fn presence(&self) -> &PresenceMetrics {
        &self.presence_metrics
    }

    /// Record an AMQP message consumed from an exchange
    pub fn record_amqp_message(&self, exchange: &str) {
        self.service_metrics
            .amqp_messages_total
            .with_label_values(&[exchange])
            .inc();
    }

    /// Record an AMQP handling failure
    pub fn record_amqp_error(&self, exchange: &str) {
        self.service_metrics
            .amqp_errors_total
            .with_label_values(&[exchange])
            .inc();
    }

    /// Record a user entering the matching queue
    pub fn record_enqueue(&self, gender: Gender) {
        self.queue_metrics
            .enqueued_total
            .with_label_values(&[&gender.to_string()])
            .inc();
    }

    /// Record a user leaving the queue before matching
    pub fn record_dequeue(&self, gender: Gender) {
        self.queue_metrics
            .dequeued_total
            .with_label_values(&[&gender.to_string()])
            .inc();
    }

    /// Record a completed match
    pub fn record_match_formed(&self, party_size: u32) {
        self.queue_metrics
            .matches_total
            .with_label_values(&[&party_size.to_string()])
            .inc();
    }

    /// Record a room being created
    pub fn record_room_created(&self, kind: RoomKind) {
        self.room_metrics
            .rooms_created_total
            .with_label_values(&[&kind.to_string()])
            .inc();
    }

    /// Record a chat phase expiring into the choice phase
    pub fn record_room_timeout(&self) {
        self.room_metrics.room_timeouts_total.inc();
    }

    /// Record a finalized room and its couple count
    pub fn record_room_finalized(&self, couples: usize) {
        self.room_metrics.rooms_finalized_total.inc();
        self.room_metrics.couples_total.inc_by(couples as u64);
    }

    /// Record a socket opening on this process
    pub fn record_connection_opened(&self, active: usize) {
        self.presence_metrics.connections_active.set(active as i64);
    }

    /// Record a socket closing on this process
    pub fn record_connection_closed(&self, active: usize) {
        self.presence_metrics.connections_active.set(active as i64);
    }

    /// Record an inbound frame by kind
    pub fn record_frame_received(&self, kind: &str) {
        self.presence_metrics
            .frames_received_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Record an outbound frame abandoned on a stalled connection
    pub fn record_frame_dropped(&self) {
        self.presence_metrics.frames_dropped_total.inc();
    }
}
