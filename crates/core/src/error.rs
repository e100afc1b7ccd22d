//! Error taxonomy for the break-verification pipeline
//!
//! Per-frame errors (`PreprocessError`, `InferenceError`) are recovered inside the
//! frame scheduler. Session-setup errors (`ArtifactLoadError`, `CaptureBindingError`)
//! terminate the session and are reported to the caller through `SessionError`.

use std::path::PathBuf;
use thiserror::Error;

/// Model or label storage entry is missing or malformed
#[derive(Debug, Error)]
pub enum ArtifactLoadError {
    #[error("artifact entry '{name}' not found")]
    Missing { name: String },

    #[error("failed to read artifact entry '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("label list '{name}' contains no labels")]
    EmptyLabels { name: String },

    #[error("label list '{name}' is not valid UTF-8")]
    InvalidLabels { name: String },

    #[error("model checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("malformed model '{name}': {reason}")]
    MalformedModel { name: String, reason: String },

    #[error("unsupported input shape: side {side}, channels {channels}")]
    UnsupportedShape { side: u32, channels: u32 },
}

/// Frame could not be converted into an input tensor
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreprocessError {
    #[error("frame has empty dimensions {width}x{height}")]
    EmptyFrame { width: u32, height: u32 },

    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    BufferMismatch { expected: usize, actual: usize },

    #[error("unsupported channel count {0}, expected 1 or 3")]
    UnsupportedChannels(u32),
}

/// Failure during a single classification call
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("classifier has been released")]
    Released,

    #[error("classifier lock poisoned")]
    LockPoisoned,

    #[error("input tensor has {actual} values, model expects {expected}")]
    InvalidInput { expected: usize, actual: usize },

    #[error("model produced no scores")]
    EmptyOutput,

    #[error("score {score} at index {index} is not a probability in [0, 1]")]
    ScoreOutOfRange { index: usize, score: f32 },

    #[error("inference runtime error: {0}")]
    Runtime(String),
}

/// Camera stream could not be started or bound
#[derive(Debug, Error)]
pub enum CaptureBindingError {
    #[error("camera source is already bound")]
    AlreadyBound,

    #[error("camera source unavailable: {0}")]
    Unavailable(String),

    #[error("failed to read frames from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no decodable frames found in {0:?}")]
    NoFrames(PathBuf),
}

/// Persistence collaborator failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Session-level failure reported to the caller
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Artifact(#[from] ArtifactLoadError),

    #[error(transparent)]
    Capture(#[from] CaptureBindingError),

    #[error("artifact loader task failed: {0}")]
    Loader(String),
}
