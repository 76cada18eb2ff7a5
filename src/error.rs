//! Error types for resolver operations

use thiserror::Error;

/// Result type alias for resolver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building a resolver or exchanging
/// messages with a nameserver.
///
/// Resolution failures are not errors: `query_lookup` reports them as an
/// empty answer slice.
#[derive(Debug, Error)]
pub enum Error {
    /// Wire-level query/response error
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid construction parameters
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
