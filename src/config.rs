//! Configuration management for keyboard-tapkit
//!
//! Provides persistent configuration that is loaded from and saved to a
//! platform-specific config file.
//!
//! ## Config File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/keyboard-tapkit/config.toml` |
//! | macOS | `~/Library/Application Support/keyboard-tapkit/config.toml` |
//! | Windows | `%APPDATA%\keyboard-tapkit\config.toml` |
//!
//! ## Example
//!
//! ```no_run
//! use keyboard_tapkit::Config;
//!
//! let mut config = Config::load().unwrap_or_default();
//! config.classifier.tap_window_ms = 300;
//! config.save().expect("Failed to save config");
//! ```

use crate::keyboard::{LogicalKey, Timing};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error type for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to determine config directory
    #[error("Could not determine config directory")]
    NoConfigDir,
    /// IO error reading or writing config file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Failed to parse config file
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Failed to serialize config
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// A value parsed but is not usable
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Returns the path to the config file.
///
/// Creates the config directory if it doesn't exist.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    let app_dir = config_dir.join("keyboard-tapkit");

    if !app_dir.exists() {
        fs::create_dir_all(&app_dir)?;
    }

    Ok(app_dir.join("config.toml"))
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Tap and hold thresholds
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Raw event source
    #[serde(default)]
    pub hook: HookConfig,
    /// Hook liveness checks
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// Keys the monitor binary listens to
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Session report export
    #[serde(default)]
    pub report: ReportConfig,
}

/// Classifier thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Maximum gap between a key-up and the next key-up of the same burst (ms)
    pub tap_window_ms: u64,
    /// How long a key must stay down to count as held (ms)
    pub hold_duration_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            tap_window_ms: 500,
            hold_duration_ms: 800,
        }
    }
}

/// Raw event backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HookBackend {
    /// Read `/dev/input` directly (Linux)
    Evdev,
    /// Poll key state with `device_query`
    Polling,
}

/// Hook configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookConfig {
    pub backend: HookBackend,
    /// Sleep between device reads (ms)
    pub poll_interval_ms: u64,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            backend: HookBackend::Evdev,
            poll_interval_ms: 2,
        }
    }
}

/// Liveness supervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    pub enabled: bool,
    /// Time between health checks (ms)
    pub interval_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 2000,
        }
    }
}

/// Which keys the monitor registers callbacks for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Key names (`"fn"`, `"lshift"`, ...) or raw codes (`"30"`, `"0x1e"`)
    pub keys: Vec<String>,
    /// Highest `Tapped(n)` count to register a callback for
    pub max_tap_count: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            keys: [
                "Function",
                "LeftShift",
                "RightShift",
                "Control",
                "Alt",
                "Meta",
                "CapsLock",
                "Escape",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_tap_count: 3,
        }
    }
}

/// Report export configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReportConfig {
    /// Write a JSON session report when the monitor exits
    pub export_on_exit: bool,
    /// Where to write it; the current directory when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default config file.
    ///
    /// Returns the default configuration if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the default config file.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Classifier thresholds, rejecting zero durations
    pub fn timing(&self) -> Result<Timing, ConfigError> {
        Timing::new(
            Duration::from_millis(self.classifier.tap_window_ms),
            Duration::from_millis(self.classifier.hold_duration_ms),
        )
        .ok_or_else(|| {
            ConfigError::Invalid("tap_window_ms and hold_duration_ms must be positive".to_string())
        })
    }

    /// Parse the monitored key list
    pub fn monitored_keys(&self) -> Result<Vec<LogicalKey>, ConfigError> {
        let mut keys: Vec<LogicalKey> = Vec::with_capacity(self.monitor.keys.len());
        for spec in &self.monitor.keys {
            let key: LogicalKey = spec
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("monitor.keys: {}", e)))?;
            // Aliases such as "fn" and "globe" collapse to one key
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.hook.poll_interval_ms)
    }

    pub fn supervisor_interval(&self) -> Duration {
        Duration::from_millis(self.supervisor.interval_ms)
    }
}
