//! Image classification engine

mod artifact;
mod engine;
mod labels;
mod onnx;
mod preprocess;

pub use artifact::{
    compute_checksum, ArtifactSpec, ArtifactStore, ClassifierArtifact, FsArtifactStore,
    MemoryArtifactStore,
};
pub use engine::{argmax, best_of, ClassifierEngine, InferenceStats, MAX_INFERENCE_MS};
pub use labels::parse_labels;
pub use onnx::{OnnxBackend, OnnxClassifier};
pub use preprocess::{preprocess, Normalization, DEFAULT_MEAN, DEFAULT_STD};

use crate::error::{ArtifactLoadError, InferenceError};
use crate::models::InputTensor;

/// Trait for single-frame classifier implementations
pub trait ImageClassifier: Send + Sync {
    /// Run inference and return one score per label
    fn infer(&self, input: &InputTensor) -> Result<Vec<f32>, InferenceError>;

    /// Short identifier for diagnostics
    fn backend(&self) -> &str;
}

/// Builds a runnable classifier from opaque model bytes
pub trait ModelBackend: Send + Sync {
    fn load(
        &self,
        name: &str,
        bytes: &[u8],
        input_side: u32,
        channels: u32,
    ) -> Result<Box<dyn ImageClassifier>, ArtifactLoadError>;
}
