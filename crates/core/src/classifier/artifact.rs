//! Classifier artifact storage and loading
//!
//! An artifact is an opaque model blob plus its ordered label list. Both are
//! resolved by name from an [`ArtifactStore`] once per session and are read-only
//! afterwards.

use super::{labels::parse_labels, ImageClassifier, ModelBackend};
use crate::error::ArtifactLoadError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Read-only storage that resolves artifact entries by name
pub trait ArtifactStore: Send + Sync {
    fn read(&self, name: &str) -> Result<Vec<u8>, ArtifactLoadError>;
}

/// Artifact store backed by a directory (or absolute paths)
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl ArtifactStore for FsArtifactStore {
    fn read(&self, name: &str) -> Result<Vec<u8>, ArtifactLoadError> {
        let path = self.resolve(name);
        std::fs::read(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => ArtifactLoadError::Missing {
                name: path.display().to_string(),
            },
            _ => ArtifactLoadError::Io {
                name: path.display().to_string(),
                source,
            },
        })
    }
}

/// In-memory artifact store, useful for bundled assets and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifactStore {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.entries.insert(name.into(), bytes.into());
        self
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn read(&self, name: &str) -> Result<Vec<u8>, ArtifactLoadError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| ArtifactLoadError::Missing {
                name: name.to_string(),
            })
    }
}

/// Names and shape of the artifact to load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    /// Model entry name
    pub model: String,
    /// Label list entry name
    pub labels: String,
    /// Square input side length in pixels
    pub input_side: u32,
    /// Input channel count (1 or 3)
    pub channels: u32,
    /// Expected SHA256 of the model bytes, hex encoded
    pub model_sha256: Option<String>,
}

impl ArtifactSpec {
    pub fn new(model: impl Into<String>, labels: impl Into<String>, input_side: u32) -> Self {
        Self {
            model: model.into(),
            labels: labels.into(),
            input_side,
            channels: 3,
            model_sha256: None,
        }
    }
}

/// Loaded model plus its label vocabulary, owned by exactly one session
pub struct ClassifierArtifact {
    model: Box<dyn ImageClassifier>,
    labels: Vec<String>,
    input_side: u32,
    channels: u32,
}

impl ClassifierArtifact {
    /// Load model and labels from storage
    pub fn load(
        store: &dyn ArtifactStore,
        spec: &ArtifactSpec,
        backend: &dyn ModelBackend,
    ) -> Result<Self, ArtifactLoadError> {
        let start = Instant::now();

        if spec.input_side == 0 || !matches!(spec.channels, 1 | 3) {
            return Err(ArtifactLoadError::UnsupportedShape {
                side: spec.input_side,
                channels: spec.channels,
            });
        }

        let label_bytes = store.read(&spec.labels)?;
        let text = String::from_utf8(label_bytes).map_err(|_| ArtifactLoadError::InvalidLabels {
            name: spec.labels.clone(),
        })?;
        let labels = parse_labels(&text);
        if labels.is_empty() {
            return Err(ArtifactLoadError::EmptyLabels {
                name: spec.labels.clone(),
            });
        }

        let model_bytes = store.read(&spec.model)?;
        if let Some(expected) = &spec.model_sha256 {
            let actual = compute_checksum(&model_bytes);
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                return Err(ArtifactLoadError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
            debug!(checksum = %actual, "Model checksum validated");
        }

        let model = backend.load(&spec.model, &model_bytes, spec.input_side, spec.channels)?;

        info!(
            model = %spec.model,
            backend = model.backend(),
            labels = labels.len(),
            size_bytes = model_bytes.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Classifier artifact loaded"
        );

        Ok(Self {
            model,
            labels,
            input_side: spec.input_side,
            channels: spec.channels,
        })
    }

    /// Assemble an artifact from an already-runnable classifier
    pub fn from_parts(
        model: Box<dyn ImageClassifier>,
        labels: Vec<String>,
        input_side: u32,
        channels: u32,
    ) -> Result<Self, ArtifactLoadError> {
        if labels.is_empty() {
            return Err(ArtifactLoadError::EmptyLabels {
                name: model.backend().to_string(),
            });
        }
        if input_side == 0 || !matches!(channels, 1 | 3) {
            return Err(ArtifactLoadError::UnsupportedShape {
                side: input_side,
                channels,
            });
        }
        Ok(Self {
            model,
            labels,
            input_side,
            channels,
        })
    }

    pub fn model(&self) -> &dyn ImageClassifier {
        self.model.as_ref()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    pub fn input_side(&self) -> u32 {
        self.input_side
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Number of values the model expects per input
    pub fn tensor_len(&self) -> usize {
        self.input_side as usize * self.input_side as usize * self.channels as usize
    }

    /// Release the model handle
    pub fn close(self) {
        debug!(backend = self.model.backend(), "Releasing classifier artifact");
        drop(self);
    }
}

impl std::fmt::Debug for ClassifierArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierArtifact")
            .field("backend", &self.model.backend())
            .field("labels", &self.labels)
            .field("input_side", &self.input_side)
            .field("channels", &self.channels)
            .finish()
    }
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
