//! Configuration errors raised while registering models and tools.
//!
//! These are the only fatal errors in the runtime: any of them aborts
//! initialization.

use thiserror::Error;

use super::not_found::ResourceKind;
use crate::identifiers::IdValidationError;
use crate::model::ModelKind;

/// Invalid or incomplete configuration detected at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// A field required for the declared kind is absent.
    #[error("{subject} is missing required field '{field}'")]
    MissingField {
        subject: String,
        field: &'static str,
    },

    /// A field is present but its value is unusable.
    #[error("{subject} has an invalid value: {message}")]
    InvalidValue { subject: String, message: String },

    /// The handler reference of a tool does not resolve to any known handler.
    #[error("tool '{tool}' references unknown handler '{handler}'")]
    UnresolvedHandler { tool: String, handler: String },

    /// The handler resolved but exposes nothing to execute.
    #[error("handler for tool '{tool}' has no executable entry point")]
    MissingEntryPoint { tool: String },

    /// An embedding model names a provider nobody registered.
    #[error("model '{model}' references unknown provider '{provider}'")]
    UnknownProvider { model: String, provider: String },

    /// A model was requested for a role its kind cannot serve.
    #[error("model '{model}' is a {actual} model, expected {expected}")]
    WrongModelKind {
        model: String,
        expected: ModelKind,
        actual: ModelKind,
    },

    /// The same name was registered twice.
    #[error("{kind} '{name}' is already registered")]
    Duplicate { kind: ResourceKind, name: String },

    /// A model or tool name failed identifier validation.
    #[error("invalid identifier '{name}': {source}")]
    InvalidIdentifier {
        name: String,
        #[source]
        source: IdValidationError,
    },
}

impl ConfigurationError {
    /// Build a `MissingField` error.
    pub fn missing_field(subject: impl Into<String>, field: &'static str) -> Self {
        Self::MissingField {
            subject: subject.into(),
            field,
        }
    }

    /// Build an `InvalidValue` error.
    pub fn invalid_value(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            subject: subject.into(),
            message: message.into(),
        }
    }

    /// Stable code for logs and reports.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "MISSING_FIELD",
            Self::InvalidValue { .. } => "INVALID_VALUE",
            Self::UnresolvedHandler { .. } => "UNRESOLVED_HANDLER",
            Self::MissingEntryPoint { .. } => "MISSING_ENTRY_POINT",
            Self::UnknownProvider { .. } => "UNKNOWN_PROVIDER",
            Self::WrongModelKind { .. } => "WRONG_MODEL_KIND",
            Self::Duplicate { .. } => "DUPLICATE",
            Self::InvalidIdentifier { .. } => "INVALID_IDENTIFIER",
        }
    }
}

/// Result type alias for registration operations.
pub type ConfigResult<T> = Result<T, ConfigurationError>;
