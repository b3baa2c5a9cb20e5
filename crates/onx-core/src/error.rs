//! Core error types

use thiserror::Error;

/// Errors from loading or persisting the emulator configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("no config directory available on this platform")]
    NoConfigDir,
}

/// Top-level error type for the core crate
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias used across the core crate
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
