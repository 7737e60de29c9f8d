//! # Kestrel
//!
//! An embeddable agent runtime. [`AgentRuntime`] composes:
//!
//! - a model registry of embedding and generative model handles
//! - a tool registry whose handlers are resolved by key at startup
//! - a memory manager of conversation sessions with optional semantic
//!   search and persistence
//! - a priority task scheduler with a concurrency cap and recurring
//!   maintenance jobs
//!
//! ```rust,no_run
//! use kestrel::{AgentRuntime, Message, RuntimeConfig, ToolDescriptor};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), kestrel::RuntimeError> {
//! let config = RuntimeConfig::builder()
//!     .tool(ToolDescriptor::new("upper", "builtin.text_uppercase"))
//!     .build()?;
//! let runtime = AgentRuntime::initialize(config).await?;
//!
//! let result = runtime.invoke_tool("upper", json!({"text": "hi"})).await;
//! assert!(result.success);
//!
//! runtime.append_message("s1", Message::user("hello")).await;
//! let id = runtime.submit_task("summarize", 5, async { Ok(json!("done")) })?;
//! let task = runtime.wait_for_task(id).await;
//! assert!(task.is_some());
//!
//! runtime.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod runtime;

pub use config::{ConfigError, MemoryConfig, RuntimeConfig, RuntimeConfigBuilder, VectorStoreConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use runtime::{AgentRuntime, AgentRuntimeBuilder, SESSION_CLEANUP_JOB, TASK_CLEANUP_JOB};

pub use kestrel_core::{
    ConfigurationError, EmbeddingModel, HashingEmbedder, Message, ModelConfig, ModelDescriptor,
    ModelHandle, ModelKind, ModelStatus, NotFound, ResourceKind, Role, TaskError, TaskId,
    ToolError,
};
pub use kestrel_memory::{
    FileSessionStore, InMemorySessionStore, InMemoryVectorStore, SessionStore, VectorStore,
};
pub use kestrel_observability::{LogFormat, ObservabilityConfig};
pub use kestrel_scheduler::{SchedulerConfig, SchedulerMetrics, Task, TaskStatus};
pub use kestrel_tools::{HandlerCatalog, Tool, ToolDescriptor, ToolHandler, ToolResult};
