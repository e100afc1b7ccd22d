//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Settings read from `~/.config/eyebreak/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Agent API endpoint URL
    pub api_url: Option<String>,
}

impl Config {
    /// Load the user config, falling back to defaults when the file is absent
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Command line or environment wins over the file, then the built-in default
    pub fn resolve_api_url(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("eyebreak").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();

        assert!(config.api_url.is_none());
        assert_eq!(config.resolve_api_url(None), DEFAULT_API_URL);
    }

    #[test]
    fn test_file_value_used_unless_overridden() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"api_url": "http://pi.local:9000"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.resolve_api_url(None), "http://pi.local:9000");
        assert_eq!(
            config.resolve_api_url(Some("http://other:1".to_string())),
            "http://other:1"
        );
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
