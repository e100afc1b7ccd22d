//! ONNX inference using tract
//!
//! Loads an image classifier taking a single NHWC float input of shape
//! `[1, side, side, channels]` and producing one score per label.

use super::{ImageClassifier, ModelBackend};
use crate::error::{ArtifactLoadError, InferenceError};
use crate::models::InputTensor;
use anyhow::{Context, Result};
use tract_onnx::prelude::*;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Classifier backed by an optimized tract plan
pub struct OnnxClassifier {
    model: TractModel,
    input_side: u32,
    channels: u32,
}

impl OnnxClassifier {
    /// Parse and optimize an ONNX model from bytes
    pub fn from_bytes(model_bytes: &[u8], input_side: u32, channels: u32) -> Result<Self> {
        let shape = [1, input_side as usize, input_side as usize, channels as usize];
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact(shape).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;

        Ok(Self {
            model,
            input_side,
            channels,
        })
    }

    fn to_tensor(&self, input: &InputTensor) -> Result<Tensor, InferenceError> {
        let side = self.input_side as usize;
        let channels = self.channels as usize;
        let expected = side * side * channels;
        if input.len() != expected {
            return Err(InferenceError::InvalidInput {
                expected,
                actual: input.len(),
            });
        }

        let array =
            tract_ndarray::Array4::from_shape_vec((1, side, side, channels), input.data.clone())
                .map_err(|e| InferenceError::Runtime(e.to_string()))?;
        Ok(array.into())
    }
}

impl ImageClassifier for OnnxClassifier {
    fn infer(&self, input: &InputTensor) -> Result<Vec<f32>, InferenceError> {
        let tensor = self.to_tensor(input)?;

        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;
        let output = outputs.first().ok_or(InferenceError::EmptyOutput)?;

        let view = output
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;
        let scores: Vec<f32> = view.iter().copied().collect();

        if scores.is_empty() {
            return Err(InferenceError::EmptyOutput);
        }
        Ok(scores)
    }

    fn backend(&self) -> &str {
        "tract-onnx"
    }
}

/// Default backend that loads models with tract-onnx
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxBackend;

impl ModelBackend for OnnxBackend {
    fn load(
        &self,
        name: &str,
        bytes: &[u8],
        input_side: u32,
        channels: u32,
    ) -> Result<Box<dyn ImageClassifier>, ArtifactLoadError> {
        let classifier = OnnxClassifier::from_bytes(bytes, input_side, channels).map_err(|e| {
            ArtifactLoadError::MalformedModel {
                name: name.to_string(),
                reason: format!("{:#}", e),
            }
        })?;
        Ok(Box::new(classifier))
    }
}
