//! Server error types.

use std::io;

use thiserror::Error;

/// Errors surfaced by the server lifecycle.
///
/// Per-request failures never show up here; they are turned into HTTP
/// responses by the dispatch pipeline.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen socket could not be bound.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        /// Configured address.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// [`start`](crate::Server::start) was called on a server that already ran.
    #[error("server already started")]
    AlreadyStarted,

    /// The accept loop failed for a reason other than shutdown.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    /// The OS signal handlers could not be installed.
    #[error("failed to register signal handler: {0}")]
    Signal(#[source] io::Error),

    /// In-flight requests did not finish before the shutdown deadline.
    #[error("server shutdown timed out with {active} active connections")]
    ShutdownTimeout {
        /// Connections still open when the deadline passed.
        active: usize,
    },
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
