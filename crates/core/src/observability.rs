//! Observability for break verification
//!
//! Provides:
//! - Prometheus metrics for the frame pipeline and session outcomes
//! - Structured JSON logging of session lifecycle events with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for inference latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5];

static GLOBAL_METRICS: OnceLock<VerifierMetricsInner> = OnceLock::new();

struct VerifierMetricsInner {
    frames_received: IntCounter,
    frames_throttled: IntCounter,
    frames_stale_dropped: IntCounter,
    inference_latency_seconds: Histogram,
    inference_errors: IntCounter,
    preprocess_errors: IntCounter,
    breaks_completed: IntCounter,
    sessions_started: IntCounter,
    sessions_cancelled: IntCounter,
    labels_loaded: IntGauge,
}

impl VerifierMetricsInner {
    fn new() -> Self {
        Self {
            frames_received: register_int_counter!(
                "eyebreak_frames_received_total",
                "Frames delivered to the scheduler by the camera"
            )
            .expect("Failed to register frames_received"),

            frames_throttled: register_int_counter!(
                "eyebreak_frames_throttled_total",
                "Frames dropped by the inference throttle"
            )
            .expect("Failed to register frames_throttled"),

            frames_stale_dropped: register_int_counter!(
                "eyebreak_frames_stale_dropped_total",
                "Frames replaced in the hand-off slot before the scheduler saw them"
            )
            .expect("Failed to register frames_stale_dropped"),

            inference_latency_seconds: register_histogram!(
                "eyebreak_inference_latency_seconds",
                "Time spent preprocessing and classifying one frame",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register inference_latency_seconds"),

            inference_errors: register_int_counter!(
                "eyebreak_inference_errors_total",
                "Classification calls that produced the error result"
            )
            .expect("Failed to register inference_errors"),

            preprocess_errors: register_int_counter!(
                "eyebreak_preprocess_errors_total",
                "Frames discarded because they could not be preprocessed"
            )
            .expect("Failed to register preprocess_errors"),

            breaks_completed: register_int_counter!(
                "eyebreak_breaks_completed_total",
                "Verified breaks"
            )
            .expect("Failed to register breaks_completed"),

            sessions_started: register_int_counter!(
                "eyebreak_sessions_started_total",
                "Break-verification sessions started"
            )
            .expect("Failed to register sessions_started"),

            sessions_cancelled: register_int_counter!(
                "eyebreak_sessions_cancelled_total",
                "Break-verification sessions cancelled before completion"
            )
            .expect("Failed to register sessions_cancelled"),

            labels_loaded: register_int_gauge!(
                "eyebreak_labels_loaded",
                "Number of labels in the most recently loaded classifier artifact"
            )
            .expect("Failed to register labels_loaded"),
        }
    }
}

/// Handle to the process-wide Prometheus metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct VerifierMetrics {
    _private: (),
}

impl Default for VerifierMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl VerifierMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(VerifierMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &VerifierMetricsInner {
        GLOBAL_METRICS.get_or_init(VerifierMetricsInner::new)
    }

    pub fn inc_frames_received(&self) {
        self.inner().frames_received.inc();
    }

    pub fn inc_frames_throttled(&self) {
        self.inner().frames_throttled.inc();
    }

    pub fn add_frames_stale_dropped(&self, count: u64) {
        self.inner().frames_stale_dropped.inc_by(count);
    }

    pub fn observe_inference_latency(&self, duration_secs: f64) {
        self.inner().inference_latency_seconds.observe(duration_secs);
    }

    pub fn inc_inference_errors(&self) {
        self.inner().inference_errors.inc();
    }

    pub fn inc_preprocess_errors(&self) {
        self.inner().preprocess_errors.inc();
    }

    pub fn inc_breaks_completed(&self) {
        self.inner().breaks_completed.inc();
    }

    pub fn inc_sessions_started(&self) {
        self.inner().sessions_started.inc();
    }

    pub fn inc_sessions_cancelled(&self) {
        self.inner().sessions_cancelled.inc();
    }

    pub fn set_labels_loaded(&self, count: usize) {
        self.inner().labels_loaded.set(count as i64);
    }
}

/// Structured logger for session lifecycle events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    device_name: String,
}

impl StructuredLogger {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn log_session_started(&self, session_id: &str, break_duration_secs: u64) {
        info!(
            event = "session_started",
            device = %self.device_name,
            session_id = %session_id,
            break_duration_secs = break_duration_secs,
            "Break verification started"
        );
    }

    pub fn log_break_completed(&self, session_id: &str, label: &str, confidence: f32) {
        info!(
            event = "break_completed",
            device = %self.device_name,
            session_id = %session_id,
            label = %label,
            confidence = confidence,
            "Break verified"
        );
    }

    pub fn log_session_cancelled(&self, session_id: &str, reason: &str) {
        info!(
            event = "session_cancelled",
            device = %self.device_name,
            session_id = %session_id,
            reason = %reason,
            "Break verification cancelled"
        );
    }

    pub fn log_artifact_loaded(&self, session_id: &str, model: &str, labels: usize) {
        info!(
            event = "artifact_loaded",
            device = %self.device_name,
            session_id = %session_id,
            model = %model,
            labels = labels,
            "Classifier ready"
        );
    }

    pub fn log_artifact_load_failed(&self, session_id: &str, model: &str, error: &str) {
        warn!(
            event = "artifact_load_failed",
            device = %self.device_name,
            session_id = %session_id,
            model = %model,
            error = %error,
            "Classifier could not be loaded, aborting this break"
        );
    }

    pub fn log_startup(&self, version: &str, model: &str) {
        info!(
            event = "agent_started",
            device = %self.device_name,
            agent_version = %version,
            model = %model,
            "Break agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            device = %self.device_name,
            reason = %reason,
            "Break agent shutting down"
        );
    }
}
