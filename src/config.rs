// src/config.rs
//! Configuration management: which acquisition source to start

use crate::error::{LocationError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Acquisition source selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Gpsd { host: String, port: u16 },
    Serial { port: String, baudrate: u32 },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Gpsd {
            host: "localhost".to_string(),
            port: 2947,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub source: SourceConfig,
    /// tracing filter directive, e.g. "info" or "loc_provider=debug"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl ProviderConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            LocationError::Parse(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;

        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        tracing::info!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// `$HOME/.config/loc-provider/config.json`
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| LocationError::invalid("HOME environment variable not set"))?;

        Ok(PathBuf::from(home)
            .join(".config")
            .join("loc-provider")
            .join("config.json"))
    }

    /// Update serial port settings
    pub fn update_serial(&mut self, port: String, baudrate: u32) {
        self.source = SourceConfig::Serial { port, baudrate };
    }

    /// Update gpsd settings
    pub fn update_gpsd(&mut self, host: String, port: u16) {
        self.source = SourceConfig::Gpsd { host, port };
    }
}
