//! AMQP integration for the matchmaking and room service
//!
//! This module handles all AMQP connections, event publishing, and the
//! per-process consumer queues that feed the room manager and the presence
//! registry.

pub mod connection;
pub mod handlers;
pub mod messages;
pub mod publisher;

// Re-export commonly used types
pub use connection::AmqpConnection;
pub use handlers::{AppEventHandler, MatchEventHandler};
pub use messages::*;
pub use publisher::EventPublisher;
