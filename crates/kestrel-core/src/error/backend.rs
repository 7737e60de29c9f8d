//! Failures of the optional memory backends.
//!
//! The memory manager logs these and carries on with the in-memory
//! operation; they never fail an append or a read.

use std::fmt;
use thiserror::Error;

/// Which optional backend failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    VectorStore,
    Persistence,
    Embedding,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::VectorStore => "vector store",
            Self::Persistence => "persistence",
            Self::Embedding => "embedding",
        };
        f.write_str(name)
    }
}

/// Error reported by a vector store, persistence or embedding backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{backend} I/O failure: {source}")]
    Io {
        backend: BackendKind,
        #[source]
        source: std::io::Error,
    },

    #[error("{backend} serialization failure: {source}")]
    Serialization {
        backend: BackendKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("{backend} rejected key '{key}': {reason}")]
    InvalidKey {
        backend: BackendKind,
        key: String,
        reason: String,
    },

    #[error("{backend} operation failed: {message}")]
    Operation {
        backend: BackendKind,
        message: String,
    },
}

impl BackendError {
    pub fn io(backend: BackendKind, source: std::io::Error) -> Self {
        Self::Io { backend, source }
    }

    pub fn serialization(backend: BackendKind, source: serde_json::Error) -> Self {
        Self::Serialization { backend, source }
    }

    pub fn operation(backend: BackendKind, message: impl Into<String>) -> Self {
        Self::Operation {
            backend,
            message: message.into(),
        }
    }

    /// The backend this error originated from.
    pub fn backend(&self) -> BackendKind {
        match self {
            Self::Io { backend, .. }
            | Self::Serialization { backend, .. }
            | Self::InvalidKey { backend, .. }
            | Self::Operation { backend, .. } => *backend,
        }
    }
}

/// Result type alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
