//! Error Types
//!
//! Errors are grouped by the failure class they describe:
//! - `configuration`: invalid or incomplete model/tool configuration (fatal at startup)
//! - `not_found`: lookup misses for models, tools, tasks and sessions
//! - `tool`: failures raised by tool handlers, always captured into a `ToolResult`
//! - `task`: failures raised by scheduled task handlers, recorded on the task
//! - `backend`: vector store, persistence and embedding failures, logged and swallowed

mod backend;
mod configuration;
mod not_found;
mod task;
mod tool;

pub use backend::{BackendError, BackendKind, BackendResult};
pub use configuration::{ConfigResult, ConfigurationError};
pub use not_found::{NotFound, ResourceKind};
pub use task::TaskError;
pub use tool::ToolError;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::IdValidationError;

    #[test]
    fn test_not_found_tool_message() {
        let error = NotFound::tool("missing");
        assert_eq!(error.to_string(), "tool not found: missing");
        assert_eq!(error.kind, ResourceKind::Tool);
    }

    #[test]
    fn test_not_found_kinds_render_lowercase() {
        assert_eq!(NotFound::model("m").to_string(), "model not found: m");
        assert_eq!(NotFound::task("t").to_string(), "task not found: t");
        assert_eq!(NotFound::session("s").to_string(), "session not found: s");
    }

    #[test]
    fn test_configuration_error_display() {
        let error = ConfigurationError::UnresolvedHandler {
            tool: "weather".to_string(),
            handler: "plugins.weather".to_string(),
        };
        assert!(error.to_string().contains("weather"));
        assert!(error.to_string().contains("plugins.weather"));

        let error = ConfigurationError::MissingEntryPoint {
            tool: "x".to_string(),
        };
        assert!(error.to_string().contains("no executable entry point"));
    }

    #[test]
    fn test_invalid_identifier_keeps_source() {
        use std::error::Error as _;

        let error = ConfigurationError::InvalidIdentifier {
            name: "bad name".to_string(),
            source: IdValidationError::InvalidCharacters,
        };
        assert!(error.source().is_some());
        assert!(error.to_string().contains("bad name"));
    }

    #[test]
    fn test_task_error_conversions() {
        let from_str: TaskError = "boom".into();
        assert_eq!(from_str.message(), "boom");

        let from_tool: TaskError = ToolError::execution("tool failed").into();
        assert_eq!(from_tool.to_string(), "tool failed");
    }

    #[test]
    fn test_backend_error_reports_backend() {
        let error = BackendError::operation(BackendKind::VectorStore, "index offline");
        assert_eq!(error.backend(), BackendKind::VectorStore);
        assert!(error.to_string().contains("vector store"));
    }
}
