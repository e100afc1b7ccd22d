//! Health check infrastructure for the break-verification agent
//!
//! Tracks per-component status (camera, classifier, session) and answers
//! liveness and readiness probes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Working, but recent operations have been failing
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Health of one component at its last check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across all components
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|health| health.status)
            .fold(ComponentStatus::Healthy, |worst, status| match (worst, status) {
                (ComponentStatus::Unhealthy, _) | (_, ComponentStatus::Unhealthy) => {
                    ComponentStatus::Unhealthy
                }
                (ComponentStatus::Degraded, _) | (_, ComponentStatus::Degraded) => {
                    ComponentStatus::Degraded
                }
                _ => ComponentStatus::Healthy,
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const CAMERA: &str = "camera";
    pub const CLASSIFIER: &str = "classifier";
    pub const SESSION: &str = "session";
}

#[derive(Debug, Default)]
struct RegistryState {
    components: HashMap<String, ComponentHealth>,
    ready: bool,
}

/// Shared registry of component health, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component as healthy
    pub async fn register(&self, name: &str) {
        self.set_healthy(name).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        let mut state = self.state.write().await;
        state.components.insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Flip once startup has finished
    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    pub async fn status_of(&self, name: &str) -> Option<ComponentStatus> {
        let state = self.state.read().await;
        state.components.get(name).map(|health| health.status)
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.state.read().await.components.clone();
        HealthResponse {
            status: HealthResponse::compute_status(&components),
            components,
        }
    }

    /// Ready once started, for as long as no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        let reason = if !state.ready {
            Some("Agent not yet initialized")
        } else if !HealthResponse::compute_status(&state.components).is_operational() {
            Some("Critical component unhealthy")
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason: reason.map(str::to_string),
        }
    }
}
