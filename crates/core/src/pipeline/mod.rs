//! Frame pipeline: camera hand-off, throttle, and inference dispatch

mod capture;
mod scheduler;
mod throttle;

pub use capture::{CameraSource, FrameSlot, ManualCamera, ManualFeed, ReplayCamera, SlotStats};
pub use scheduler::{analyze_frame, FrameOutcome, FrameScheduler, SchedulerConfig};
pub use throttle::{FrameThrottle, DEFAULT_THROTTLE_INTERVAL};

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-session frame counters, written by the scheduler and read by snapshots
#[derive(Debug, Default)]
pub struct PipelineCounters {
    frames_received: AtomicU64,
    frames_throttled: AtomicU64,
    inferences: AtomicU64,
    inference_failures: AtomicU64,
    preprocess_failures: AtomicU64,
}

/// Point-in-time copy of [`PipelineCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub frames_received: u64,
    pub frames_throttled: u64,
    pub inferences: u64,
    pub inference_failures: u64,
    pub preprocess_failures: u64,
}

impl PipelineCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_throttled(&self) {
        self.frames_throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inference_done(&self, failed: bool) {
        self.inferences.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.inference_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn preprocess_failed(&self) {
        self.preprocess_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_throttled: self.frames_throttled.load(Ordering::Relaxed),
            inferences: self.inferences.load(Ordering::Relaxed),
            inference_failures: self.inference_failures.load(Ordering::Relaxed),
            preprocess_failures: self.preprocess_failures.load(Ordering::Relaxed),
        }
    }
}
