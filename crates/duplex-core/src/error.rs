//! Shared error type for duplex core operations.

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by core types.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration. Fatal at startup: the process refuses to run
    /// with undefined behavior rather than limping along.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error while reading configuration.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
