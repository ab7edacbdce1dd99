//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from loading or interpreting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file could not be read.
    #[error("Failed to read config file {path:?}: {source}")]
    ReadError {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A config file was not valid TOML.
    #[error("Failed to parse config file {path:?}: {source}")]
    ParseError {
        /// Path that failed to parse.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// An upstream proxy address was not `HOST:PORT`.
    #[error("Invalid upstream proxy address '{0}': expected HOST:PORT")]
    InvalidUpstream(String),

    /// A rules URL did not parse.
    #[error("Invalid rules URL '{url}': {message}")]
    InvalidRulesUrl {
        /// The offending URL.
        url: String,
        /// Parse failure detail.
        message: String,
    },
}
