//! Emulator configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Log verbosity selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Debug and diagnostics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Log verbosity
    pub log_level: LogLevel,
    /// Mirror log output to a file
    pub log_to_file: bool,
    /// Path of the log file when `log_to_file` is set
    pub log_path: PathBuf,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            log_to_file: false,
            log_path: PathBuf::from("oxidized-nx.log"),
        }
    }
}

/// GPU driver emulation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NvdrvConfig {
    /// Initial submission timeout in milliseconds; 0 keeps the driver
    /// default of never timing out
    pub submit_timeout_ms: u32,
}

impl Default for NvdrvConfig {
    fn default() -> Self {
        Self {
            submit_timeout_ms: 0,
        }
    }
}

/// Top-level emulator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Debug and diagnostics settings
    pub debug: DebugConfig,
    /// GPU driver emulation settings
    pub nvdrv: NvdrvConfig,
}

impl Config {
    /// Default location of the configuration file
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("oxidized-nx").join("config.toml"))
    }

    /// Load the configuration from the default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load the configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Persist the configuration to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.debug.log_level, LogLevel::Info);
        assert!(!config.debug.log_to_file);
        assert_eq!(config.nvdrv.submit_timeout_ms, 0);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = Config::default();
        config.debug.log_level = LogLevel::Trace;
        config.nvdrv.submit_timeout_ms = 5000;

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.debug.log_level, LogLevel::Trace);
        assert_eq!(parsed.nvdrv.submit_timeout_ms, 5000);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = toml::from_str("[debug]\nlog_level = \"warn\"\n").unwrap();
        assert_eq!(parsed.debug.log_level, LogLevel::Warn);
        assert_eq!(parsed.nvdrv.submit_timeout_ms, 0);
    }
}
