//! Health checks
//!
//! Readiness and liveness reporting for the gateway's `/health` endpoint,
//! with per-component checks against the shared store and the room store.

use crate::presence::registry::PresenceRegistry;
use crate::room::store::RoomStore;
use crate::store::{keys, SharedStore};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::debug;

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Sockets held by this process
    pub local_connections: usize,
    /// Durable room records on this process
    pub active_rooms: usize,
    /// Users currently waiting for a match, fleet-wide
    pub waiting_users: usize,
    /// Seconds since this process started
    pub uptime_seconds: u64,
}

/// Everything the health endpoint needs
pub struct HealthState {
    service_name: String,
    store: Arc<dyn SharedStore>,
    rooms: Arc<dyn RoomStore>,
    registry: Arc<PresenceRegistry>,
    is_running: Arc<RwLock<bool>>,
    started_at: Instant,
}

impl HealthState {
    pub fn new(
        service_name: String,
        store: Arc<dyn SharedStore>,
        rooms: Arc<dyn RoomStore>,
        registry: Arc<PresenceRegistry>,
        is_running: Arc<RwLock<bool>>,
    ) -> Self {
        Self {
            service_name,
            store,
            rooms,
            registry,
            is_running,
            started_at: Instant::now(),
        }
    }
}

impl HealthCheck {
    /// Perform a health check of the service
    pub async fn check(state: &HealthState) -> Result<Self> {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        let service_check = Self::check_service_running(state).await;
        if service_check.status != HealthStatus::Healthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(service_check);

        let store_check = Self::check_store(state).await;
        if store_check.status == HealthStatus::Unhealthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(store_check);

        let stats = Self::gather_stats(state).await;
        debug!(
            "Health check complete - status: {}, connections: {}, rooms: {}",
            overall_status, stats.local_connections, stats.active_rooms
        );

        Ok(HealthCheck {
            status: overall_status,
            service: state.service_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    async fn check_service_running(state: &HealthState) -> ComponentCheck {
        let start = Instant::now();
        let running = *state.is_running.read().await;
        ComponentCheck {
            name: "service".to_string(),
            status: if running {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            message: (!running).then(|| "Service is not running".to_string()),
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Probe the shared store with a cheap read
    async fn check_store(state: &HealthState) -> ComponentCheck {
        let start = Instant::now();
        match state.store.set_len(keys::WAITING_USERS).await {
            Ok(_) => ComponentCheck {
                name: "shared_store".to_string(),
                status: HealthStatus::Healthy,
                message: None,
                duration_ms: start.elapsed().as_millis() as u64,
            },
            Err(e) => ComponentCheck {
                name: "shared_store".to_string(),
                status: HealthStatus::Unhealthy,
                message: Some(e.to_string()),
                duration_ms: start.elapsed().as_millis() as u64,
            },
        }
    }

    async fn gather_stats(state: &HealthState) -> ServiceStats {
        let waiting_users = state
            .store
            .set_len(keys::WAITING_USERS)
            .await
            .unwrap_or_default();
        let active_rooms = state.rooms.count().await.unwrap_or_default();
        ServiceStats {
            local_connections: state.registry.connection_count(),
            active_rooms,
            waiting_users,
            uptime_seconds: state.started_at.elapsed().as_secs(),
        }
    }
}
