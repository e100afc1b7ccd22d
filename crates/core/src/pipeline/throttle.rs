//! Inference cadence control

use std::time::{Duration, Instant};

/// Minimum gap between two accepted frames
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(800);

/// Decides which delivered frames are submitted for inference
///
/// A frame is accepted only when the interval has elapsed since the last accepted
/// frame and no inference is currently running. Owned by a single scheduler task.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    interval: Duration,
    last_accepted: Option<Instant>,
}

impl Default for FrameThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_INTERVAL)
    }
}

impl FrameThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_accepted: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_accepted(&self) -> Option<Instant> {
        self.last_accepted
    }

    /// Returns true if the frame captured at `at` should be classified.
    /// Accepting records `at` as the new reference point.
    pub fn try_accept(&mut self, at: Instant, busy: bool) -> bool {
        if busy {
            return false;
        }
        match self.last_accepted {
            // Out-of-order timestamps saturate to zero and are rejected
            Some(last) if at.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last_accepted = Some(at);
                true
            }
        }
    }
}
