//! Error types for configuration loading.

use thiserror::Error;

use crate::errors::FixedPointError;

/// Errors that can occur while loading or validating an inference configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read configuration file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Unable to parse configuration file '{path}': {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("Invalid configuration value for '{field}': {message}")]
    Validation { field: String, message: String },

    #[error(transparent)]
    Precision(#[from] FixedPointError),
}
