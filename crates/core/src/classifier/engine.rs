//! Serialized single-frame classification
//!
//! The engine owns the session's artifact behind a mutex so at most one
//! inference runs against the model handle at a time. Failures never escape:
//! they are logged and reported as the `"error"` sentinel result.

use super::ClassifierArtifact;
use crate::error::InferenceError;
use crate::models::{ClassificationResult, InputTensor, UNKNOWN_LABEL};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, warn};

/// Inference latency above which a warning is logged
pub const MAX_INFERENCE_MS: u128 = 250;

/// Number of leading scores included in diagnostics
const SCORE_PREVIEW_LEN: usize = 5;

/// Session-scoped classifier engine
pub struct ClassifierEngine {
    artifact: Mutex<Option<ClassifierArtifact>>,
    input_side: u32,
    channels: u32,
    inference_count: AtomicU64,
    failed_count: AtomicU64,
    slow_inference_count: AtomicU64,
}

impl ClassifierEngine {
    pub fn new(artifact: ClassifierArtifact) -> Self {
        Self {
            input_side: artifact.input_side(),
            channels: artifact.channels(),
            artifact: Mutex::new(Some(artifact)),
            inference_count: AtomicU64::new(0),
            failed_count: AtomicU64::new(0),
            slow_inference_count: AtomicU64::new(0),
        }
    }

    pub fn input_side(&self) -> u32 {
        self.input_side
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Classify one tensor. Concurrent callers block until the model is free.
    pub fn classify(&self, tensor: &InputTensor) -> ClassificationResult {
        let start = Instant::now();
        self.inference_count.fetch_add(1, Ordering::Relaxed);

        match self.try_classify(tensor) {
            Ok(result) => {
                let elapsed = start.elapsed();
                let preview_len = result.scores.len().min(SCORE_PREVIEW_LEN);
                if elapsed.as_millis() > MAX_INFERENCE_MS {
                    self.slow_inference_count.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        elapsed_ms = elapsed.as_millis(),
                        "Inference exceeded {}ms target", MAX_INFERENCE_MS
                    );
                }
                debug!(
                    elapsed_us = elapsed.as_micros(),
                    label = %result.label,
                    confidence = result.confidence,
                    scores = ?&result.scores[..preview_len],
                    "Inference completed"
                );
                result
            }
            Err(e) => {
                self.failed_count.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Inference failed, reporting error result");
                ClassificationResult::error()
            }
        }
    }

    fn try_classify(&self, tensor: &InputTensor) -> Result<ClassificationResult, InferenceError> {
        let guard = self
            .artifact
            .lock()
            .map_err(|_| InferenceError::LockPoisoned)?;
        let artifact = guard.as_ref().ok_or(InferenceError::Released)?;

        if tensor.len() != artifact.tensor_len() {
            return Err(InferenceError::InvalidInput {
                expected: artifact.tensor_len(),
                actual: tensor.len(),
            });
        }

        let scores = artifact.model().infer(tensor)?;
        best_of(scores, artifact.labels())
    }

    /// Release the artifact. Returns false if it was already released.
    ///
    /// Blocks until any in-flight inference has finished.
    pub fn close(&self) -> bool {
        let taken = match self.artifact.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match taken {
            Some(artifact) => {
                artifact.close();
                true
            }
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        match self.artifact.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }

    /// Get inference statistics
    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            total_inferences: self.inference_count.load(Ordering::Relaxed),
            failed_inferences: self.failed_count.load(Ordering::Relaxed),
            slow_inferences: self.slow_inference_count.load(Ordering::Relaxed),
        }
    }
}

/// Inference statistics
#[derive(Debug, Clone, Default)]
pub struct InferenceStats {
    pub total_inferences: u64,
    pub failed_inferences: u64,
    pub slow_inferences: u64,
}

/// Index of the highest score. Ties go to the first occurrence; NaN never wins.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((idx, score)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Build a result from a score vector parallel to `labels`.
///
/// Scores must already be probabilities; logits or NaN are rejected rather
/// than coerced, so the confidence is always the raw maximum.
pub fn best_of(
    scores: Vec<f32>,
    labels: &[String],
) -> Result<ClassificationResult, InferenceError> {
    if let Some((index, &score)) = scores
        .iter()
        .enumerate()
        .find(|(_, score)| !(0.0..=1.0).contains(*score))
    {
        return Err(InferenceError::ScoreOutOfRange { index, score });
    }

    let idx = argmax(&scores).ok_or(InferenceError::EmptyOutput)?;
    let label = labels
        .get(idx)
        .cloned()
        .unwrap_or_else(|| UNKNOWN_LABEL.to_string());
    let confidence = scores[idx];
    Ok(ClassificationResult::new(label, confidence, scores))
}
