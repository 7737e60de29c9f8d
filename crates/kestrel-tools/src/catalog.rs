//! Startup-time mapping from handler keys to handlers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::builtin;
use crate::handler::{Tool, ToolHandler};

/// Handlers addressable by key from tool descriptors.
#[derive(Debug, Clone, Default)]
pub struct HandlerCatalog {
    handlers: HashMap<String, ToolHandler>,
}

impl HandlerCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog preloaded with `builtin.echo`, `builtin.text_uppercase` and
    /// `builtin.json_parse`.
    pub fn with_builtins() -> Self {
        Self::new()
            .with_handler(builtin::ECHO, builtin::echo())
            .with_handler(builtin::TEXT_UPPERCASE, builtin::text_uppercase())
            .with_handler(builtin::JSON_PARSE, builtin::json_parse())
    }

    pub fn with_handler(mut self, key: impl Into<String>, handler: ToolHandler) -> Self {
        self.insert(key, handler);
        self
    }

    /// Add a [`Tool`] under its own name.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        let key = tool.name().to_string();
        self.insert(key, ToolHandler::from_tool(tool));
        self
    }

    /// Add or replace a handler; returns the one it replaced.
    pub fn insert(&mut self, key: impl Into<String>, handler: ToolHandler) -> Option<ToolHandler> {
        self.handlers.insert(key.into(), handler)
    }

    pub fn resolve(&self, key: &str) -> Option<&ToolHandler> {
        self.handlers.get(key)
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kestrel_core::ToolError;
    use serde_json::{Value, json};

    struct Reverse;

    #[async_trait]
    impl Tool for Reverse {
        fn name(&self) -> &str {
            "text.reverse"
        }

        async fn execute(&self, params: Value) -> Result<Value, ToolError> {
            let text = params["text"].as_str().unwrap_or_default();
            Ok(json!(text.chars().rev().collect::<String>()))
        }
    }

    #[test]
    fn test_builtins_are_listed() {
        let catalog = HandlerCatalog::with_builtins();
        assert_eq!(
            catalog.keys(),
            vec!["builtin.echo", "builtin.json_parse", "builtin.text_uppercase"]
        );
    }

    #[test]
    fn test_insert_replaces() {
        let mut catalog = HandlerCatalog::new();
        assert!(catalog.insert("k", ToolHandler::without_entry_point()).is_none());
        assert!(catalog.insert("k", builtin::echo()).is_some());
        assert!(catalog.resolve("k").unwrap().has_entry_point());
        assert!(catalog.resolve("missing").is_none());
    }

    #[tokio::test]
    async fn test_with_tool_keys_by_tool_name() {
        let catalog = HandlerCatalog::new().with_tool(Arc::new(Reverse));
        assert_eq!(catalog.keys(), vec!["text.reverse"]);

        let handler = catalog.resolve("text.reverse").unwrap();
        assert!(handler.has_entry_point());
        let execute = handler.execute.clone().unwrap();
        assert_eq!(execute(json!({"text": "abc"})).await.unwrap(), json!("cba"));
    }
}
