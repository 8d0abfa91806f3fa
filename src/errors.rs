// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The task's command configuration has no command name.
    #[error("task '{0}' has no command name")]
    MissingCommand(String),

    #[error("unknown variable '{variable}' in '{value}'")]
    UnknownVariable { variable: String, value: String },

    #[error("process surface error: {0}")]
    Surface(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, EngineError>;
