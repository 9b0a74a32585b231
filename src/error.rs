//! Error types for the stub server.

use thiserror::Error;

/// Errors raised while building stubs or running the listener.
#[derive(Error, Debug)]
pub enum StubError {
    /// A path or body pattern failed to compile.
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The listener could not be bound.
    #[error("failed to bind stub server listener: {0}")]
    Bind(#[from] std::io::Error),

    /// A stubbed response carries a header hyper refuses to emit.
    #[error("invalid response header: {0}")]
    InvalidHeader(String),

    /// Server settings are out of range.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// Result type alias for stub server operations.
pub type Result<T> = std::result::Result<T, StubError>;
