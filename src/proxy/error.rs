//! Error types for proxy operations.
//!
//! This module defines the error taxonomy for the forwarding proxy:
//! - Framing errors (oversized or unparseable request headers)
//! - Resolution errors (malformed targets, self-loop destinations)
//! - Connect errors (outbound connection establishment)
//! - Server errors (binding the listener)
//!
//! Every variant except `Bind` is scoped to a single session: it closes
//! that session and never terminates the listening service.

use thiserror::Error;

/// Unified error type for proxy operations.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// I/O error (socket operations).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unterminated request header block exceeded the size bound.
    #[error("Request header block exceeded {limit} bytes without terminator")]
    RequestTooLarge {
        /// The configured header buffer limit.
        limit: usize,
    },

    /// Request header block could not be parsed.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Request target could not be resolved to a destination.
    #[error("Malformed request target: {0}")]
    MalformedTarget(String),

    /// Destination points back at the proxy's own listening port.
    #[error("Destination port {port} loops back to the proxy itself")]
    LoopDetected {
        /// The offending destination port (equal to the listen port).
        port: u16,
    },

    /// Failed to establish the outbound connection.
    #[error("Failed to connect to '{addr}': {source}")]
    Connect {
        /// The address we tried to connect to.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to bind the listening socket. Fatal to the whole service.
    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        /// The address we tried to bind to.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

impl ProxyError {
    /// Whether this error is a routine connection termination rather than
    /// something worth surfacing at warn level.
    pub fn is_benign_disconnect(&self) -> bool {
        match self {
            ProxyError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
