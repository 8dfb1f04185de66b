//! Server error types.

use thiserror::Error;

/// Errors raised while starting the server. All of them are fatal.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind (e.g. port already in use).
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Other listener I/O failure.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}
