//! Application configuration
//!
//! Loaded from a TOML file in the platform config directory. Every section
//! has defaults so a missing or partial file still yields a usable config.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::constants::{AAC_MIME_TYPE, DEFAULT_USER_AGENT};
use crate::error::{Error, Result};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub audio: AudioConfig,
    pub logging: LoggingConfig,
}

/// Remote stream settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// SHOUTcast server URL
    pub url: String,
    /// Declared content type of the stream
    pub mime_type: String,
    /// User agent sent with the stream request
    pub user_agent: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000/stream".to_string(),
            mime_type: AAC_MIME_TYPE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Audio output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device id (`output:<name>`); `None` uses the default device
    pub device_id: Option<String>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Default config path, e.g. `~/.config/soundtrack/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "soundtrack").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load from the default path, falling back to defaults if the file is absent
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Write configuration as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [stream]
            url = "http://radio.example.com:8000/aac"
            "#,
        )
        .unwrap();

        assert_eq!(config.stream.url, "http://radio.example.com:8000/aac");
        assert_eq!(config.stream.mime_type, AAC_MIME_TYPE);
        assert_eq!(config.logging.filter, "info");
        assert!(config.audio.device_id.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = AppConfig::default();
        config.audio.device_id = Some("output:Speakers".to_string());
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "stream = 5").unwrap();

        assert!(matches!(AppConfig::load(&path), Err(Error::Config(_))));
    }
}
