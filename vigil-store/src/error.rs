//! Storage layer errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the state file failed
    #[error("IO error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error (reading persisted state)
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Persisted state violates domain invariants
    #[error("Domain error: {0}")]
    Domain(#[from] vigil_domain::DomainError),
}

impl StoreError {
    /// Create an IO error for a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
