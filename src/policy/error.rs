//! Error types for policy evaluation and rules management.
//!
//! Policy errors are never fatal to a proxy session: the session falls back
//! to a direct connection and continues. They can, however, surface at
//! startup when a rules file is unreadable.

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for policy operations.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A directive string could not be parsed.
    #[error("Invalid directive '{0}'")]
    InvalidDirective(String),

    /// A rules document could not be parsed.
    #[error("Invalid rules document: {0}")]
    InvalidRules(String),

    /// Fetching the remote rules file failed.
    #[error("Failed to fetch rules from '{url}': {message}")]
    Fetch {
        /// The rules URL.
        url: String,
        /// Error message from the HTTP client.
        message: String,
    },

    /// Reading or writing the on-disk rules cache failed.
    #[error("Rules cache error at {path:?}: {source}")]
    Cache {
        /// The cache file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
