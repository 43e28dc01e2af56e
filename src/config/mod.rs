//! Configuration management for the mingle-room service
//!
//! This module handles all configuration loading from environment variables,
//! TOML files, validation, and default values for the service.

pub mod app;

// Re-export commonly used types
pub use app::{
    validate_config, AmqpSettings, AppConfig, MatchingSettings, PresenceSettings, RedisSettings,
    RoomSettings, ServiceSettings,
};
