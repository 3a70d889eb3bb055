//! Core error types.

use thiserror::Error;

/// Errors raised outside the migration pipeline proper.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Boxed error crossing a collaborator boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
