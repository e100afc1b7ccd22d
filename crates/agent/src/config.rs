//! Agent configuration

use anyhow::{ensure, Context, Result};
use eyebreak_core::classifier::{ArtifactSpec, Normalization, DEFAULT_MEAN, DEFAULT_STD};
use eyebreak_core::pipeline::SchedulerConfig;
use eyebreak_core::session::{
    AcceptanceRule, LabelMatcher, SessionConfig, DEFAULT_CLOSED_EYE_ALIASES,
    DEFAULT_CONFIDENCE_THRESHOLD,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration, read from `EYEBREAK_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name reported in structured logs
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_model_path")]
    pub model_path: String,

    #[serde(default = "default_labels_path")]
    pub labels_path: String,

    /// Expected SHA256 of the model file
    #[serde(default)]
    pub model_sha256: Option<String>,

    #[serde(default = "default_input_side")]
    pub input_side: u32,

    #[serde(default = "default_channels")]
    pub channels: u32,

    #[serde(default = "default_normalization_mean")]
    pub normalization_mean: f32,

    #[serde(default = "default_normalization_std")]
    pub normalization_std: f32,

    #[serde(default = "default_throttle_interval_ms")]
    pub throttle_interval_ms: u64,

    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Label fragments counted as "eyes closed", comma separated in the environment
    #[serde(default = "default_accepted_labels")]
    pub accepted_labels: Vec<String>,

    #[serde(default = "default_break_duration_secs")]
    pub break_duration_secs: u64,

    /// Directory of still images replayed as the camera feed
    #[serde(default)]
    pub frames_dir: Option<PathBuf>,

    #[serde(default = "default_replay_fps")]
    pub replay_fps: u32,

    /// JSON file holding the last completion timestamp
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

fn default_device_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_model_path() -> String {
    "model.onnx".to_string()
}

fn default_labels_path() -> String {
    "labels.txt".to_string()
}

fn default_input_side() -> u32 {
    224
}

fn default_channels() -> u32 {
    3
}

fn default_normalization_mean() -> f32 {
    DEFAULT_MEAN
}

fn default_normalization_std() -> f32 {
    DEFAULT_STD
}

fn default_throttle_interval_ms() -> u64 {
    800
}

fn default_confidence_threshold() -> f32 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_accepted_labels() -> Vec<String> {
    DEFAULT_CLOSED_EYE_ALIASES
        .iter()
        .map(|alias| alias.to_string())
        .collect()
}

fn default_break_duration_secs() -> u64 {
    20
}

fn default_replay_fps() -> u32 {
    15
}

fn default_state_path() -> PathBuf {
    PathBuf::from("eyebreak-state.json")
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let source = config::Environment::with_prefix("EYEBREAK")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("accepted_labels");
        Self::from_source(source)
    }

    /// Build configuration from any `config` source
    pub fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config: AgentConfig = config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.input_side > 0, "input_side must be positive");
        ensure!(
            matches!(self.channels, 1 | 3),
            "channels must be 1 or 3, got {}",
            self.channels
        );
        ensure!(
            (0.0..=1.0).contains(&self.confidence_threshold),
            "confidence_threshold must be within [0, 1], got {}",
            self.confidence_threshold
        );
        ensure!(
            self.normalization_std != 0.0,
            "normalization_std must be non-zero"
        );
        ensure!(
            self.accepted_labels.iter().any(|l| !l.trim().is_empty()),
            "accepted_labels must name at least one label"
        );
        Ok(())
    }

    pub fn artifact_spec(&self) -> ArtifactSpec {
        ArtifactSpec {
            model: self.model_path.clone(),
            labels: self.labels_path.clone(),
            input_side: self.input_side,
            channels: self.channels,
            model_sha256: self.model_sha256.clone(),
        }
    }

    /// Session template used for every break started by the agent
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            artifact: self.artifact_spec(),
            scheduler: SchedulerConfig {
                throttle_interval: Duration::from_millis(self.throttle_interval_ms),
                normalization: Normalization::new(self.normalization_mean, self.normalization_std),
            },
            rule: AcceptanceRule::new(
                LabelMatcher::new(&self.accepted_labels),
                self.confidence_threshold,
            ),
            break_duration: Duration::from_secs(self.break_duration_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix("EYEBREAK")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("accepted_labels")
            .source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::from_source(env(&[])).unwrap();

        assert_eq!(config.api_port, 8080);
        assert_eq!(config.input_side, 224);
        assert_eq!(config.channels, 3);
        assert_eq!(config.throttle_interval_ms, 800);
        assert_eq!(config.confidence_threshold, 0.85);
        assert_eq!(config.break_duration_secs, 20);
        assert!(config.frames_dir.is_none());
        assert!(config.accepted_labels.contains(&"closed_eyes".to_string()));

        let session = config.session_config();
        assert_eq!(session.scheduler.throttle_interval, Duration::from_millis(800));
        assert_eq!(session.rule.threshold(), 0.85);
    }

    #[test]
    fn test_environment_overrides() {
        let config = AgentConfig::from_source(env(&[
            ("EYEBREAK_API_PORT", "9191"),
            ("EYEBREAK_MODEL_PATH", "/opt/models/eyes.onnx"),
            ("EYEBREAK_ACCEPTED_LABELS", "asleep,Eyes Shut"),
            ("EYEBREAK_CONFIDENCE_THRESHOLD", "0.7"),
            ("EYEBREAK_FRAMES_DIR", "/tmp/frames"),
        ]))
        .unwrap();

        assert_eq!(config.api_port, 9191);
        assert_eq!(config.artifact_spec().model, "/opt/models/eyes.onnx");
        assert_eq!(config.accepted_labels, vec!["asleep", "Eyes Shut"]);
        assert_eq!(config.frames_dir, Some(PathBuf::from("/tmp/frames")));

        let rule = config.session_config().rule;
        assert!(rule.matcher().matches("EYES_SHUT"));
        assert!(!rule.matcher().matches("Close_eyes"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(AgentConfig::from_source(env(&[("EYEBREAK_CHANNELS", "4")])).is_err());
        assert!(
            AgentConfig::from_source(env(&[("EYEBREAK_CONFIDENCE_THRESHOLD", "1.5")])).is_err()
        );
    }
}
