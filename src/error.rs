//! Error types for the matchmaking and room service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking and room scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchingError {
    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Shared store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("User is already queued for matching: {user_id}")]
    AlreadyQueued { user_id: String },

    #[error("User already has an active connection: {user_id}")]
    PresenceConflict { user_id: String },

    #[error("Room not found: {room_id}")]
    RoomNotFound { room_id: String },

    #[error("Invalid room transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid socket frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("Profile lookup failed for user: {user_id}")]
    ProfileLookupFailed { user_id: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
