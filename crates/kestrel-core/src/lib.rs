//! # Kestrel Core
//!
//! Shared contracts for the Kestrel agent runtime:
//!
//! - [`error`]: the error taxonomy (configuration, not-found, tool, task, backend)
//! - [`identifiers`]: validated names and generated ids
//! - [`message`]: conversation messages
//! - [`model`]: the model registry
//! - [`embedding`]: the embedding model contract and the built-in hashing provider

pub mod embedding;
pub mod error;
pub mod identifiers;
pub mod message;
pub mod model;

pub use embedding::{EmbeddingFactory, EmbeddingModel, HashingEmbedder};
pub use error::{
    BackendError, BackendKind, BackendResult, ConfigResult, ConfigurationError, NotFound,
    ResourceKind, TaskError, ToolError,
};
pub use identifiers::{IdValidationError, IdValidator, MessageId, ModelName, TaskId, ToolName};
pub use message::{Message, Role};
pub use model::{ModelConfig, ModelDescriptor, ModelHandle, ModelKind, ModelRegistry, ModelStatus};
