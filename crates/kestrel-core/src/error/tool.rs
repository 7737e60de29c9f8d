//! Errors raised by tool handlers.
//!
//! A `ToolError` never propagates past the executor; it is folded into the
//! `error` field of the tool result.

use thiserror::Error;

/// Failure reported by a tool handler or its release hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    /// The handler ran and reported a failure.
    #[error("{0}")]
    Execution(String),

    /// The parameters did not match what the handler expects.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// The handler panicked while executing.
    #[error("tool panicked: {0}")]
    Panicked(String),

    /// The release hook failed.
    #[error("release failed: {0}")]
    Release(String),
}

impl ToolError {
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidParams(err.to_string())
    }
}
