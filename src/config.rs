//! Configuration management for devlock
//!
//! Handles loading and parsing of the YAML configuration file. Every
//! reconciliation tunable lives here so deployments can trade polling
//! overhead against reaction time without a rebuild.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "default_audio_config")]
    pub audio: ReconcileConfig,
    #[serde(default = "default_camera_config")]
    pub camera: ReconcileConfig,
    /// Preferences file path; defaults to the platform config directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefs_path: Option<String>,
}

/// Per-class reconciliation tunables
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Periodic tick interval in milliseconds
    pub tick_interval_ms: u64,
    /// Debounce window after a successful apply; None = one tick
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
    /// Cap for the exponential retry backoff
    pub max_backoff_ms: u64,
    /// Failed applies before a device is suspended
    pub max_consecutive_failures: u32,
    /// Consecutive absent enumerations before a device is evicted
    pub absence_threshold: u32,
    /// Volume drift below this many percent is ignored (OS rounding)
    pub volume_tolerance: u8,
    /// Per-call timeout for provider operations
    pub provider_timeout_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 5000,
            debounce_ms: None,
            max_backoff_ms: 60_000,
            max_consecutive_failures: 5,
            absence_threshold: 3,
            volume_tolerance: 0,
            provider_timeout_ms: 3000,
        }
    }
}

impl ReconcileConfig {
    /// Effective debounce window (defaults to one tick)
    pub fn debounce_window_ms(&self) -> u64 {
        self.debounce_ms.unwrap_or(self.tick_interval_ms)
    }
}

fn default_audio_config() -> ReconcileConfig {
    ReconcileConfig {
        // The audio lock polls tighter than the camera scan
        tick_interval_ms: 1000,
        ..ReconcileConfig::default()
    }
}

fn default_camera_config() -> ReconcileConfig {
    ReconcileConfig::default()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            audio: default_audio_config(),
            camera: default_camera_config(),
            prefs_path: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path))?;

        Ok(config)
    }

    /// Load from file when it exists, defaults otherwise
    pub async fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.audio.tick_interval_ms, 1000);
        assert_eq!(config.camera.tick_interval_ms, 5000);
        assert_eq!(config.camera.max_consecutive_failures, 5);
        assert_eq!(config.camera.absence_threshold, 3);
        assert_eq!(config.camera.volume_tolerance, 0);
    }

    #[test]
    fn test_debounce_defaults_to_one_tick() {
        let mut config = ReconcileConfig::default();
        assert_eq!(config.debounce_window_ms(), config.tick_interval_ms);
        config.debounce_ms = Some(250);
        assert_eq!(config.debounce_window_ms(), 250);
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
audio:
  tick_interval_ms: 200
  volume_tolerance: 5
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.audio.tick_interval_ms, 200);
        assert_eq!(config.audio.volume_tolerance, 5);
        // Unspecified sections keep their defaults
        assert_eq!(config.camera.tick_interval_ms, 5000);
    }
}
