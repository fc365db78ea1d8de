//! Error types for webdiag core.
//!
//! Every variant here is a startup-time failure. Once a
//! [`RequestIdGenerator`](crate::RequestIdGenerator) exists, nothing in this
//! crate fails on the request path.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while initialising core components.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The operating system random source could not supply entropy.
    #[error("random source unavailable: {0}")]
    Entropy(#[from] rand::Error),

    /// A random string of zero length was requested.
    #[error("invalid random string length: {0}")]
    InvalidLength(usize),
}
