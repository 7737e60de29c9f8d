//! Tool handlers.

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use kestrel_core::ToolError;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Executable entry point of a handler.
pub type ExecuteFn =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync>;

/// Optional hook run when the registry is released.
pub type ReleaseFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), ToolError>> + Send + Sync>;

/// Object-style tool implementation.
///
/// Implementors are wrapped into a [`ToolHandler`] with
/// [`ToolHandler::from_tool`]; `release` becomes the handler's release hook.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// JSON schema describing accepted parameters.
    fn parameter_schema(&self) -> Option<Value> {
        None
    }

    async fn execute(&self, params: Value) -> Result<Value, ToolError>;

    async fn release(&self) -> Result<(), ToolError> {
        Ok(())
    }
}

/// What a handler key resolves to.
///
/// A handler without an `execute` entry point can sit in a catalog, but
/// registering a tool against it is a configuration error.
#[derive(Clone, Default)]
pub struct ToolHandler {
    pub(crate) execute: Option<ExecuteFn>,
    pub(crate) release: Option<ReleaseFn>,
    pub(crate) parameter_schema: Option<Value>,
}

impl ToolHandler {
    /// Handler backed by an async closure.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        let execute: ExecuteFn = Arc::new(move |params| f(params).boxed());
        Self {
            execute: Some(execute),
            ..Self::default()
        }
    }

    /// Handler delegating to a [`Tool`] implementation.
    pub fn from_tool(tool: Arc<dyn Tool>) -> Self {
        let for_execute = Arc::clone(&tool);
        let execute: ExecuteFn = Arc::new(move |params| {
            let tool = Arc::clone(&for_execute);
            async move { tool.execute(params).await }.boxed()
        });
        let for_release = Arc::clone(&tool);
        let release: ReleaseFn = Arc::new(move || {
            let tool = Arc::clone(&for_release);
            async move { tool.release().await }.boxed()
        });
        Self {
            execute: Some(execute),
            release: Some(release),
            parameter_schema: tool.parameter_schema(),
        }
    }

    /// Handler with nothing to execute.
    pub fn without_entry_point() -> Self {
        Self::default()
    }

    pub fn with_release<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ToolError>> + Send + 'static,
    {
        let release: ReleaseFn = Arc::new(move || f().boxed());
        self.release = Some(release);
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.parameter_schema = Some(schema);
        self
    }

    pub fn has_entry_point(&self) -> bool {
        self.execute.is_some()
    }
}

impl fmt::Debug for ToolHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolHandler")
            .field("execute", &self.execute.is_some())
            .field("release", &self.release.is_some())
            .field("parameter_schema", &self.parameter_schema)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Counter {
        released: AtomicBool,
    }

    #[async_trait]
    impl Tool for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn parameter_schema(&self) -> Option<Value> {
            Some(json!({"type": "object"}))
        }

        async fn execute(&self, params: Value) -> Result<Value, ToolError> {
            let n = params["n"]
                .as_i64()
                .ok_or_else(|| ToolError::invalid_params("'n' must be an integer"))?;
            Ok(json!(n + 1))
        }

        async fn release(&self) -> Result<(), ToolError> {
            self.released.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_from_tool_wires_execute_and_release() {
        let tool = Arc::new(Counter {
            released: AtomicBool::new(false),
        });
        let handler = ToolHandler::from_tool(tool.clone());
        assert!(handler.has_entry_point());
        assert_eq!(handler.parameter_schema, Some(json!({"type": "object"})));

        let execute = handler.execute.clone().unwrap();
        assert_eq!(execute(json!({"n": 41})).await.unwrap(), json!(42));
        assert!(execute(json!({})).await.is_err());

        (handler.release.unwrap())().await.unwrap();
        assert!(tool.released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_without_entry_point() {
        let handler = ToolHandler::without_entry_point().with_schema(json!({}));
        assert!(!handler.has_entry_point());
    }
}
