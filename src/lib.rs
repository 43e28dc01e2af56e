//! Mingle Room - Matchmaking and room lifecycle service for anonymous group dating
//!
//! This crate provides AMQP-driven matchmaking queues, the room lifecycle
//! state machine, socket presence with cross-process fan-out, and the
//! final-choice aggregation that turns group chats into couples.

pub mod amqp;
pub mod choice;
pub mod config;
pub mod error;
pub mod metrics;
pub mod presence;
pub mod profile;
pub mod queue;
pub mod room;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchingError, Result};
pub use types::*;

// Re-export key components
pub use amqp::publisher::EventPublisher;
pub use choice::FinalChoiceAggregator;
pub use presence::PresenceRegistry;
pub use queue::MatchQueue;
pub use room::RoomLifecycleManager;
pub use store::SharedStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
