//! Runtime error type.

use kestrel_core::{BackendError, ConfigurationError, NotFound};
use kestrel_observability::MetricsError;
use kestrel_scheduler::SchedulerError;

use crate::config::ConfigError;

/// Errors surfaced by [`AgentRuntime`](crate::AgentRuntime) operations.
///
/// Only `Configuration`, `Config` and `Backend` can come out of
/// initialization; per-operation failures of tools and tasks are reported in
/// their result objects instead.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    NotFound(#[from] NotFound),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

impl RuntimeError {
    /// Get the error code suitable for logging or reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            RuntimeError::Configuration(e) => e.error_code(),
            RuntimeError::Config(_) => "INVALID_CONFIG",
            RuntimeError::NotFound(_) => "NOT_FOUND",
            RuntimeError::Scheduler(SchedulerError::ShutDown) => "SHUT_DOWN",
            RuntimeError::Scheduler(SchedulerError::InvalidInterval { .. }) => "INVALID_INTERVAL",
            RuntimeError::Backend(_) => "BACKEND_ERROR",
            RuntimeError::Metrics(_) => "METRICS_ERROR",
        }
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err: RuntimeError = ConfigurationError::MissingEntryPoint { tool: "x".into() }.into();
        assert_eq!(err.error_code(), "MISSING_ENTRY_POINT");

        let err: RuntimeError = NotFound::model("m").into();
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert_eq!(err.to_string(), "model not found: m");

        let err: RuntimeError = SchedulerError::ShutDown.into();
        assert_eq!(err.error_code(), "SHUT_DOWN");
    }
}
