//! Frame scheduling loop
//!
//! Pulls frames from the slot, applies the throttle, and dispatches accepted
//! frames to the blocking pool for preprocessing and classification. At most
//! one frame is in flight. Results are sent, in acceptance order, on the
//! completion channel consumed by the session's decision loop.

use super::{FrameSlot, FrameThrottle, PipelineCounters, DEFAULT_THROTTLE_INTERVAL};
use crate::classifier::{preprocess, ClassifierEngine, Normalization};
use crate::error::PreprocessError;
use crate::models::{ClassificationResult, FrameSample};
use crate::observability::VerifierMetrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for the frame scheduler
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Minimum gap between accepted frames
    pub throttle_interval: Duration,
    /// Pixel normalization applied during preprocessing
    pub normalization: Normalization,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
            normalization: Normalization::default(),
        }
    }
}

/// What became of one accepted frame
#[derive(Debug)]
pub enum FrameOutcome {
    Classified(ClassificationResult),
    /// Frame could not be turned into a tensor and was released unclassified
    Discarded(PreprocessError),
}

/// Preprocess and classify one frame. The frame is released before inference starts.
pub fn analyze_frame(
    engine: &ClassifierEngine,
    frame: FrameSample,
    normalization: Normalization,
) -> FrameOutcome {
    let tensor = match preprocess(&frame, engine.input_side(), engine.channels(), normalization) {
        Ok(tensor) => tensor,
        Err(e) => return FrameOutcome::Discarded(e),
    };
    drop(frame);

    FrameOutcome::Classified(engine.classify(&tensor))
}

pub struct FrameScheduler {
    engine: Arc<ClassifierEngine>,
    throttle: FrameThrottle,
    normalization: Normalization,
    counters: Arc<PipelineCounters>,
    metrics: VerifierMetrics,
}

impl FrameScheduler {
    pub fn new(
        engine: Arc<ClassifierEngine>,
        config: SchedulerConfig,
        counters: Arc<PipelineCounters>,
        metrics: VerifierMetrics,
    ) -> Self {
        Self {
            engine,
            throttle: FrameThrottle::new(config.throttle_interval),
            normalization: config.normalization,
            counters,
            metrics,
        }
    }

    /// Run until cancelled, the slot closes, or the result receiver goes away.
    ///
    /// A frame still being classified on exit is left to finish on the blocking
    /// pool; its result is discarded.
    pub async fn run(
        mut self,
        slot: Arc<FrameSlot>,
        results: mpsc::Sender<ClassificationResult>,
        cancel: CancellationToken,
    ) {
        info!(
            interval_ms = self.throttle.interval().as_millis() as u64,
            "Starting frame scheduler"
        );

        let mut inflight: JoinSet<(FrameOutcome, Duration)> = JoinSet::new();
        let mut stale_seen = 0u64;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Frame scheduler cancelled");
                    break;
                }

                Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                    let (outcome, elapsed) = match joined {
                        Ok(done) => done,
                        Err(e) => {
                            warn!(error = %e, "Inference worker failed");
                            (FrameOutcome::Classified(ClassificationResult::error()), Duration::ZERO)
                        }
                    };

                    match outcome {
                        FrameOutcome::Discarded(e) => {
                            warn!(error = %e, "Discarding frame that could not be preprocessed");
                            self.counters.preprocess_failed();
                            self.metrics.inc_preprocess_errors();
                        }
                        FrameOutcome::Classified(result) => {
                            let failed = result.is_error();
                            self.counters.inference_done(failed);
                            self.metrics.observe_inference_latency(elapsed.as_secs_f64());
                            if failed {
                                self.metrics.inc_inference_errors();
                            }
                            if results.send(result).await.is_err() {
                                debug!("Result receiver closed, stopping scheduler");
                                break;
                            }
                        }
                    }
                }

                frame = slot.next() => {
                    let Some(frame) = frame else {
                        debug!("Frame slot closed");
                        break;
                    };

                    self.counters.frame_received();
                    self.metrics.inc_frames_received();

                    let replaced = slot.stats().replaced;
                    if replaced > stale_seen {
                        self.metrics.add_frames_stale_dropped(replaced - stale_seen);
                        stale_seen = replaced;
                    }

                    if !self.throttle.try_accept(frame.captured_at, !inflight.is_empty()) {
                        self.counters.frame_throttled();
                        self.metrics.inc_frames_throttled();
                        continue;
                    }

                    let engine = self.engine.clone();
                    let normalization = self.normalization;
                    inflight.spawn_blocking(move || {
                        let start = Instant::now();
                        let outcome = analyze_frame(&engine, frame, normalization);
                        (outcome, start.elapsed())
                    });
                }
            }
        }

        inflight.detach_all();
        let stats = self.counters.snapshot();
        info!(
            frames_received = stats.frames_received,
            frames_throttled = stats.frames_throttled,
            inferences = stats.inferences,
            "Frame scheduler stopped"
        );
    }
}
