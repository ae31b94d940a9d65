//! Error types for Rustible CloudStack.
//!
//! Module-level failures are reported through [`ModuleError`]; this type wraps
//! them together with the configuration and I/O failures that can happen
//! before a module ever runs.

use crate::modules::ModuleError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Rustible CloudStack.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Error reading a configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead {
        /// Path to the config file
        path: PathBuf,
        /// Source error
        #[source]
        source: std::io::Error,
    },

    /// Error parsing a configuration file.
    #[error("Failed to parse config file '{path}': {message}")]
    ConfigParse {
        /// Path to the config file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Requested API region has no section in the configuration.
    #[error("Region '{0}' not found in configuration")]
    RegionNotFound(String),

    // ========================================================================
    // Module Errors
    // ========================================================================
    /// Module execution failed.
    #[error(transparent)]
    Module(#[from] ModuleError),

    // ========================================================================
    // Parameter Errors
    // ========================================================================
    /// Module arguments could not be parsed.
    #[error("Invalid module arguments: {0}")]
    InvalidArgs(String),

    // ========================================================================
    // Serialization / IO
    // ========================================================================
    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a config parse error.
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParse {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<Error> for ModuleError {
    fn from(err: Error) -> Self {
        match err {
            Error::Module(inner) => inner,
            other => ModuleError::Config(other.to_string()),
        }
    }
}
