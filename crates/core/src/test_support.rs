//! Fakes shared by the unit tests

use crate::classifier::{ClassifierArtifact, ClassifierEngine, ImageClassifier, ModelBackend};
use crate::error::{ArtifactLoadError, InferenceError};
use crate::models::{FrameSample, InputTensor, PixelFormat};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn labels() -> Vec<String> {
    vec!["Close_eyes".to_string(), "Open_eyes".to_string()]
}

pub const LABELS_TXT: &[u8] = b"0 Close_eyes\n1 Open_eyes\n";

/// Side length used by test artifacts, small enough to keep preprocessing cheap
pub const TEST_SIDE: u32 = 4;

/// Classifier that replays scripted outcomes, then falls back to fixed scores
#[derive(Clone)]
pub struct ScriptedClassifier {
    fallback: Vec<f32>,
    script: Arc<Mutex<VecDeque<Result<Vec<f32>, String>>>>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedClassifier {
    pub fn new(fallback: Vec<f32>) -> Self {
        Self {
            fallback,
            script: Arc::new(Mutex::new(VecDeque::new())),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn then_fail(self, error: InferenceError) -> Self {
        self.script.lock().unwrap().push_back(Err(error.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl ImageClassifier for ScriptedClassifier {
    fn infer(&self, _input: &InputTensor) -> Result<Vec<f32>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(scores)) => Ok(scores),
            Some(Err(message)) => Err(InferenceError::Runtime(message)),
            None => Ok(self.fallback.clone()),
        }
    }

    fn backend(&self) -> &str {
        "scripted"
    }
}

/// Backend handing out clones of one scripted classifier
pub struct ScriptedBackend {
    classifier: ScriptedClassifier,
}

impl ScriptedBackend {
    pub fn new(classifier: ScriptedClassifier) -> Self {
        Self { classifier }
    }
}

impl ModelBackend for ScriptedBackend {
    fn load(
        &self,
        name: &str,
        bytes: &[u8],
        _input_side: u32,
        _channels: u32,
    ) -> Result<Box<dyn ImageClassifier>, ArtifactLoadError> {
        if bytes.is_empty() {
            return Err(ArtifactLoadError::MalformedModel {
                name: name.to_string(),
                reason: "empty model".to_string(),
            });
        }
        Ok(Box::new(self.classifier.clone()))
    }
}

pub fn engine_with(classifier: ScriptedClassifier) -> ClassifierEngine {
    let artifact =
        ClassifierArtifact::from_parts(Box::new(classifier), labels(), TEST_SIDE, 3).unwrap();
    ClassifierEngine::new(artifact)
}

/// A valid 8x8 grey RGB frame
pub fn frame() -> FrameSample {
    FrameSample::new(8, 8, PixelFormat::Rgb8, vec![128; 8 * 8 * 3])
}

/// Poll `condition` until it holds, panicking after two seconds
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
