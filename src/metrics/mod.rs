//! Metrics for the mingle-room service
//!
//! Prometheus families for the matching queue, room lifecycle, presence
//! layer and bus traffic, exposed through the HTTP gateway.

pub mod collector;

pub use collector::{
    MetricsCollector, PresenceMetrics, QueueMetrics, RoomMetrics, ServiceMetrics,
};
