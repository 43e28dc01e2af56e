//! HTTP gateway
//!
//! One axum server per process carrying the health probe, the Prometheus
//! exposition endpoint and the websocket upgrade. The socket route takes the
//! user id from the query string; session resolution happens upstream.

use crate::metrics::MetricsCollector;
use crate::presence::socket::{self, SocketContext};
use crate::service::health::{HealthCheck, HealthState, HealthStatus};
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

/// Shared state behind every gateway route
pub struct GatewayState {
    pub socket_ctx: Arc<SocketContext>,
    pub metrics: Arc<MetricsCollector>,
    pub health: Arc<HealthState>,
}

/// Build the gateway router
pub fn gateway_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> Response {
    match HealthCheck::check(&state.health).await {
        Ok(check) => {
            let status = match check.status {
                HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
                HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
            };
            (status, Json(check)).into_response()
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "health check failed").into_response()
        }
    }
}

async fn metrics_handler(State(state): State<Arc<GatewayState>>) -> Response {
    match state.metrics.render() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            error!("Metrics rendering failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
    user_id: String,
}

async fn ws_handler(
    State(state): State<Arc<GatewayState>>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let ctx = state.socket_ctx.clone();
    ws.on_upgrade(move |socket| socket::handle_socket(ctx, socket, params.user_id))
}
