//! Tool registry and executor.

use futures::FutureExt;
use kestrel_core::{ConfigResult, ConfigurationError, ResourceKind, ToolError, ToolName};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{PoisonError, RwLock};
use std::time::Instant;

use crate::catalog::HandlerCatalog;
use crate::handler::{ExecuteFn, ReleaseFn, ToolHandler};
use crate::result::ToolResult;

/// Declaration of a tool: the name it is invoked under and the handler key
/// it resolves to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub handler: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_schema: Option<Value>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler: handler.into(),
            parameter_schema: None,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.parameter_schema = Some(schema);
        self
    }
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    execute: ExecuteFn,
    release: Option<ReleaseFn>,
}

/// Registry of tools, resolved against a [`HandlerCatalog`].
///
/// [`execute_tool`](Self::execute_tool) never fails: unknown tools, handler
/// errors and handler panics all come back as a failed [`ToolResult`].
pub struct ToolRegistry {
    catalog: RwLock<HandlerCatalog>,
    tools: RwLock<HashMap<String, RegisteredTool>>,
}

impl ToolRegistry {
    pub fn new(catalog: HandlerCatalog) -> Self {
        Self {
            catalog: RwLock::new(catalog),
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Add a handler key after construction, for dynamic registration.
    pub fn add_handler(&self, key: impl Into<String>, handler: ToolHandler) {
        self.catalog
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, handler);
    }

    /// Register a tool.
    ///
    /// # Errors
    ///
    /// - `InvalidIdentifier` if the name is not a valid tool name
    /// - `UnresolvedHandler` if the handler key is not in the catalog
    /// - `MissingEntryPoint` if the handler has nothing to execute
    /// - `Duplicate` if a tool with this name already exists
    pub fn register_tool(&self, descriptor: ToolDescriptor) -> ConfigResult<()> {
        ToolName::parse(descriptor.name.as_str()).map_err(|source| {
            ConfigurationError::InvalidIdentifier {
                name: descriptor.name.clone(),
                source,
            }
        })?;

        let handler = self
            .catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .resolve(&descriptor.handler)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnresolvedHandler {
                tool: descriptor.name.clone(),
                handler: descriptor.handler.clone(),
            })?;

        let execute = handler
            .execute
            .ok_or_else(|| ConfigurationError::MissingEntryPoint {
                tool: descriptor.name.clone(),
            })?;

        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        if tools.contains_key(&descriptor.name) {
            return Err(ConfigurationError::Duplicate {
                kind: ResourceKind::Tool,
                name: descriptor.name,
            });
        }

        let mut descriptor = descriptor;
        if descriptor.parameter_schema.is_none() {
            descriptor.parameter_schema = handler.parameter_schema;
        }
        tracing::debug!(tool = %descriptor.name, handler = %descriptor.handler, "Registered tool");
        tools.insert(
            descriptor.name.clone(),
            RegisteredTool {
                descriptor,
                execute,
                release: handler.release,
            },
        );
        Ok(())
    }

    /// Run a tool and capture its outcome.
    pub async fn execute_tool(&self, name: &str, params: Value) -> ToolResult {
        let start = Instant::now();
        let execute = self
            .tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|tool| tool.execute.clone());

        let Some(execute) = execute else {
            tracing::debug!(tool = %name, "Tool not found");
            return ToolResult::failure(name, format!("tool not found: {name}"), start.elapsed());
        };

        let outcome = AssertUnwindSafe(async move { execute(params).await })
            .catch_unwind()
            .await;
        let elapsed = start.elapsed();

        match outcome {
            Ok(Ok(data)) => {
                tracing::debug!(tool = %name, elapsed_ms = elapsed.as_millis() as u64, "Tool succeeded");
                ToolResult::success(name, data, elapsed)
            }
            Ok(Err(error)) => {
                tracing::warn!(tool = %name, error = %error, "Tool execution failed");
                ToolResult::failure(name, error.to_string(), elapsed)
            }
            Err(panic) => {
                let error = ToolError::Panicked(panic_message(panic.as_ref()));
                tracing::error!(tool = %name, error = %error, "Tool panicked");
                ToolResult::failure(name, error.to_string(), elapsed)
            }
        }
    }

    /// Names of registered tools, sorted.
    pub fn available_tools(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Descriptor a tool was registered with, schema filled from its handler.
    pub fn tool_config(&self, name: &str) -> Option<ToolDescriptor> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|tool| tool.descriptor.clone())
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every release hook, then clear the registry.
    ///
    /// Hook failures are logged.
    pub async fn release_tools(&self) {
        let drained: Vec<(String, Option<ReleaseFn>)> = self
            .tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(name, tool)| (name, tool.release))
            .collect();

        let count = drained.len();
        for (name, release) in drained {
            let Some(release) = release else { continue };
            match AssertUnwindSafe(async move { release().await })
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::warn!(tool = %name, error = %error, "Tool release hook failed");
                }
                Err(panic) => {
                    tracing::warn!(
                        tool = %name,
                        error = %panic_message(panic.as_ref()),
                        "Tool release hook panicked"
                    );
                }
            }
        }
        if count > 0 {
            tracing::info!(count, "Released tools");
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(HandlerCatalog::with_builtins())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
