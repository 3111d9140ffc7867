//! Persistent settings for the monitor
//!
//! Settings are stored as JSON in the platform config directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use vigil_sim::FeedServerConfig;
use vigil_telemetry::{ConnectionConfig, TelemetryConfig};

/// Application settings that persist across sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Feed endpoint and reconnect timings
    pub connection: ConnectionConfig,
    /// Aggregation windows, trends and buffer size
    pub telemetry: TelemetryConfig,
    /// Seconds between printed status lines
    pub status_interval_secs: u64,
    /// Write the raw event buffer here as CSV on exit
    pub export_path: Option<PathBuf>,
    /// In-process feed used with --simulate
    pub simulation: FeedServerConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            telemetry: TelemetryConfig::default(),
            status_interval_secs: 5,
            export_path: None,
            simulation: FeedServerConfig {
                interval_ms: Some(400),
                malformed_every: Some(40),
                heartbeat_every: Some(15),
                ..Default::default()
            },
        }
    }
}

/// Get the config directory path
///
/// Uses XDG_CONFIG_HOME if set, otherwise ~/.config/vigil on every platform.
fn config_dir() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg);
        if path.is_absolute() {
            return Some(path.join("vigil"));
        }
    }
    dirs::home_dir().map(|home| home.join(".config").join("vigil"))
}

/// Default location of the settings file
pub fn settings_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("settings.json"))
}

impl Settings {
    /// Load settings from the default location, or defaults if absent or unreadable
    pub fn load() -> Self {
        let Some(path) = settings_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring settings file: {:#}", e);
                Self::default()
            }
        }
    }

    /// Load settings from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Save settings to `path`, or the default location if `None`
    ///
    /// Returns the path written.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => settings_path().context("could not determine config directory")?,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(&path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("vigil-settings-{}-{}", name, std::process::id()))
            .join("settings.json")
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"status_interval_secs": 9, "connection": {"url": "ws://feed"}}"#)
                .unwrap();
        assert_eq!(settings.status_interval_secs, 9);
        assert_eq!(settings.connection.url, "ws://feed");
        assert_eq!(settings.connection.max_reconnect_attempts, 5);
        assert_eq!(settings.telemetry, TelemetryConfig::default());
        assert_eq!(settings.simulation.interval_ms, Some(400));
    }

    #[test]
    fn test_save_then_load() {
        let path = scratch_file("roundtrip");
        let mut settings = Settings::default();
        settings.telemetry.buffer_capacity = 500;
        settings.export_path = Some(PathBuf::from("/tmp/events.csv"));

        let written = settings.save(Some(&path)).unwrap();
        assert_eq!(written, path);
        assert_eq!(Settings::load_from(&path).unwrap(), settings);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_load_from_reports_bad_json() {
        let path = scratch_file("bad");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let err = Settings::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("failed to parse"));

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_load_from_missing_file_errors() {
        assert!(Settings::load_from(Path::new("/nonexistent/vigil/settings.json")).is_err());
    }
}
