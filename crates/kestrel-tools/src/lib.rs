//! # Kestrel Tools
//!
//! Named capability handlers and the executor that runs them.
//!
//! Tools are declared by a [`ToolDescriptor`] naming a handler key. The key is
//! resolved against a [`HandlerCatalog`] when the tool is registered, so a
//! misspelled handler or a handler with nothing to execute fails startup
//! rather than the first call.
//!
//! ```rust
//! use kestrel_tools::{HandlerCatalog, ToolDescriptor, ToolRegistry};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let registry = ToolRegistry::new(HandlerCatalog::with_builtins());
//! registry
//!     .register_tool(ToolDescriptor::new("shout", "builtin.text_uppercase"))
//!     .unwrap();
//!
//! let result = registry.execute_tool("shout", json!({"text": "hi"})).await;
//! assert!(result.success);
//! assert_eq!(result.data, Some(json!({"text": "HI"})));
//!
//! let missing = registry.execute_tool("weather", json!({})).await;
//! assert_eq!(missing.error.as_deref(), Some("tool not found: weather"));
//! # });
//! ```

pub mod builtin;
pub mod catalog;
pub mod handler;
pub mod registry;
pub mod result;

pub use catalog::HandlerCatalog;
pub use handler::{ExecuteFn, ReleaseFn, Tool, ToolHandler};
pub use registry::{ToolDescriptor, ToolRegistry};
pub use result::ToolResult;

pub use kestrel_core::ToolError;
