//! Core data models for the break-verification pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::error::PreprocessError;

/// Sentinel label reported when a classification call fails
pub const ERROR_LABEL: &str = "error";

/// Sentinel label reported when the winning index has no matching label
pub const UNKNOWN_LABEL: &str = "unknown";

/// Event name under which break completions are published
pub const BREAK_COMPLETED_EVENT: &str = "break_completed";

/// Pixel layout of a captured frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Luma8,
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Luma8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// One camera frame candidate for inference
///
/// The underlying buffer is handed back to its producer when the sample is dropped,
/// so every frame is released on every path: throttled, processed or failed.
pub struct FrameSample {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
    pub captured_at: Instant,
    release: Option<ReleaseFn>,
}

impl FrameSample {
    /// Create a frame stamped with the current instant
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
            captured_at: Instant::now(),
            release: None,
        }
    }

    /// Override the capture timestamp
    pub fn with_timestamp(mut self, captured_at: Instant) -> Self {
        self.captured_at = captured_at;
        self
    }

    /// Register a callback run once when the frame is released
    pub fn on_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    /// Buffer length implied by the declared dimensions and format
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Check that dimensions are non-zero and match the buffer
    pub fn validate(&self) -> Result<(), PreprocessError> {
        if self.width == 0 || self.height == 0 {
            return Err(PreprocessError::EmptyFrame {
                width: self.width,
                height: self.height,
            });
        }
        let expected = self.expected_len();
        if self.data.len() != expected {
            return Err(PreprocessError::BufferMismatch {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

impl Drop for FrameSample {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for FrameSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSample")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("len", &self.data.len())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

/// Normalized, channel-interleaved classifier input
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    pub side: u32,
    pub channels: u32,
    pub data: Vec<f32>,
}

impl InputTensor {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// NHWC shape with a batch of one
    pub fn shape(&self) -> [usize; 4] {
        [1, self.side as usize, self.side as usize, self.channels as usize]
    }
}

/// Outcome of one inference call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: String,
    pub confidence: f32,
    pub scores: Vec<f32>,
}

impl ClassificationResult {
    pub fn new(label: impl Into<String>, confidence: f32, scores: Vec<f32>) -> Self {
        Self {
            label: label.into(),
            confidence,
            scores,
        }
    }

    /// Result standing in for a failed classification
    pub fn error() -> Self {
        Self {
            label: ERROR_LABEL.to_string(),
            confidence: 0.0,
            scores: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.label == ERROR_LABEL
    }
}

/// Break-decision state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for the next accepted frame
    AwaitingFrames,
    /// A classification result is being evaluated
    Evaluating,
    /// Break verified (terminal)
    Completed,
    /// Session aborted or torn down (terminal)
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Cancelled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::AwaitingFrames => write!(f, "awaiting_frames"),
            SessionState::Evaluating => write!(f, "evaluating"),
            SessionState::Completed => write!(f, "completed"),
            SessionState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal outcome returned to the flow that launched break verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BreakOutcome {
    Completed { label: String, confidence: f32 },
    Cancelled,
}

impl BreakOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, BreakOutcome::Completed { .. })
    }
}

/// Notification broadcast once per verified break
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakCompleted {
    pub session_id: String,
    pub result_label: String,
    pub confidence: f32,
    pub completed_at: i64,
}
