//! Outcome of a single tool invocation.

use kestrel_core::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Result of [`ToolRegistry::execute_tool`](crate::ToolRegistry::execute_tool).
///
/// Produced for every call, successful or not. Not stored by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub tool_name: String,
    pub execution_time: Duration,
}

impl ToolResult {
    pub fn success(tool_name: impl Into<String>, data: Value, execution_time: Duration) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            tool_name: tool_name.into(),
            execution_time,
        }
    }

    pub fn failure(
        tool_name: impl Into<String>,
        error: impl Into<String>,
        execution_time: Duration,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            tool_name: tool_name.into(),
            execution_time,
        }
    }

    /// Convert into a `Result`, mapping failures to `ToolError::Execution`.
    pub fn into_result(self) -> Result<Value, ToolError> {
        if self.success {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(ToolError::Execution(self.error.unwrap_or_default()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_into_result() {
        let result = ToolResult::failure("t", "boom", Duration::from_millis(3));
        assert_eq!(
            result.into_result(),
            Err(ToolError::Execution("boom".to_string()))
        );
    }

    #[test]
    fn test_success_serializes_without_error() {
        let result = ToolResult::success("t", json!(1), Duration::ZERO);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["success"], json!(true));
        assert!(value.get("error").is_none());
        assert_eq!(value["tool_name"], json!("t"));
    }
}
