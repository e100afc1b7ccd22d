//! Break-verification engine
//!
//! This crate provides the core functionality for:
//! - Loading an opaque image classifier and its label vocabulary
//! - Preprocessing camera frames into normalized input tensors
//! - Throttled, serialized on-device inference over a live frame stream
//! - The one-shot "break completed" decision state machine
//! - Health checks and observability

pub mod classifier;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod session;

#[cfg(test)]
mod test_support;

pub use error::{
    ArtifactLoadError, CaptureBindingError, InferenceError, PreprocessError, SessionError,
    StoreError,
};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{StructuredLogger, VerifierMetrics};
