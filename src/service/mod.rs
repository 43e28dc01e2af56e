//! Service layer for the mingle-room service
//!
//! The main application state, AMQP consumer wiring, background sweep loops
//! and the HTTP gateway live here.

pub mod app;
pub mod gateway;
pub mod health;

pub use app::{AppState, ServiceError};
pub use gateway::{gateway_router, GatewayState};
pub use health::{HealthCheck, HealthStatus};
