//! HTTP API for break sessions, health checks and Prometheus metrics

use crate::sessions::{BreakCoordinator, CoordinatorError};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use eyebreak_core::{ComponentStatus, HealthRegistry, VerifierMetrics};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: VerifierMetrics,
    pub coordinator: Arc<BreakCoordinator>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: VerifierMetrics,
        coordinator: Arc<BreakCoordinator>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            coordinator,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StartBreakRequest {
    pub break_duration_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Start a break session
async fn start_break(
    State(state): State<Arc<AppState>>,
    request: Option<Json<StartBreakRequest>>,
) -> Response {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let duration = request.break_duration_secs.map(Duration::from_secs);

    match state.coordinator.start(duration).await {
        Ok(snapshot) => (StatusCode::CREATED, Json(snapshot)).into_response(),
        Err(e @ CoordinatorError::AlreadyActive(_)) => {
            error_response(StatusCode::CONFLICT, e.to_string())
        }
    }
}

async fn current_break(State(state): State<Arc<AppState>>) -> Response {
    match state.coordinator.current().await {
        Some(snapshot) => Json(snapshot).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "no break session is running"),
    }
}

async fn cancel_break(State(state): State<Arc<AppState>>) -> Response {
    match state.coordinator.cancel().await {
        Some(snapshot) => Json(snapshot).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "no break session is running"),
    }
}

async fn last_break(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.coordinator.last().await)
}

/// Returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/breaks", post(start_break))
        .route("/api/v1/breaks/current", get(current_break).delete(cancel_break))
        .route("/api/v1/breaks/last", get(last_break))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
