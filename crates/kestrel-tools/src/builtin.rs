//! Handlers shipped with the runtime.

use kestrel_core::ToolError;
use serde_json::{Value, json};

use crate::handler::ToolHandler;

pub const ECHO: &str = "builtin.echo";
pub const TEXT_UPPERCASE: &str = "builtin.text_uppercase";
pub const JSON_PARSE: &str = "builtin.json_parse";

/// Returns its parameters unchanged.
pub fn echo() -> ToolHandler {
    ToolHandler::from_fn(|params: Value| async move { Ok(params) })
        .with_schema(json!({"type": "object"}))
}

/// Uppercases the `text` parameter.
pub fn text_uppercase() -> ToolHandler {
    ToolHandler::from_fn(|params: Value| async move {
        let text = required_str(&params, "text")?;
        Ok(json!({"text": text.to_uppercase()}))
    })
    .with_schema(text_schema())
}

/// Parses the `text` parameter as JSON.
pub fn json_parse() -> ToolHandler {
    ToolHandler::from_fn(|params: Value| async move {
        let text = required_str(&params, "text")?;
        serde_json::from_str::<Value>(text)
            .map_err(|e| ToolError::execution(format!("invalid JSON: {e}")))
    })
    .with_schema(text_schema())
}

fn required_str<'a>(params: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::invalid_params(format!("missing string field '{field}'")))
}

fn text_schema() -> Value {
    json!({
        "type": "object",
        "properties": {"text": {"type": "string"}},
        "required": ["text"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(handler: ToolHandler, params: Value) -> Result<Value, ToolError> {
        let execute = handler.execute.expect("builtin has entry point");
        execute(params).await
    }

    #[tokio::test]
    async fn test_echo() {
        let params = json!({"a": [1, 2]});
        assert_eq!(run(echo(), params.clone()).await.unwrap(), params);
    }

    #[tokio::test]
    async fn test_uppercase_requires_text() {
        assert_eq!(
            run(text_uppercase(), json!({"text": "abc"})).await.unwrap(),
            json!({"text": "ABC"})
        );
        assert_eq!(
            run(text_uppercase(), json!({})).await.unwrap_err(),
            ToolError::invalid_params("missing string field 'text'")
        );
    }

    #[tokio::test]
    async fn test_json_parse() {
        assert_eq!(
            run(json_parse(), json!({"text": "{\"k\": 1}"})).await.unwrap(),
            json!({"k": 1})
        );
        let err = run(json_parse(), json!({"text": "{"})).await.unwrap_err();
        assert!(err.to_string().starts_with("invalid JSON"));
    }
}
