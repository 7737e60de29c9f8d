//! Shared validation rules for named resources.

use thiserror::Error;

/// Maximum length of a model, tool or persisted session name.
pub const MAX_ID_LENGTH: usize = 128;

/// Why a name was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdValidationError {
    #[error("identifier cannot be empty")]
    Empty,

    #[error("identifier cannot have leading or trailing whitespace")]
    SurroundingWhitespace,

    #[error("identifier too long ({length} chars, max {max})")]
    TooLong { length: usize, max: usize },

    #[error("identifier cannot contain path traversal sequences")]
    PathTraversal,

    #[error(
        "identifier can only contain alphanumeric characters, hyphens, underscores, and dots"
    )]
    InvalidCharacters,
}

/// Validator applied to tool names, model names and session ids that reach disk.
pub struct IdValidator;

impl IdValidator {
    /// Check `id` against the naming rules.
    ///
    /// Accepted names are 1..=128 characters of `[A-Za-z0-9_.-]` (unicode
    /// alphanumerics included), carry no surrounding whitespace and contain
    /// no `..` segment.
    ///
    /// ```rust
    /// use kestrel_core::identifiers::IdValidator;
    ///
    /// assert!(IdValidator::validate("builtin.echo").is_ok());
    /// assert!(IdValidator::validate("session-42").is_ok());
    /// assert!(IdValidator::validate("").is_err());
    /// assert!(IdValidator::validate("../etc/passwd").is_err());
    /// ```
    pub fn validate(id: &str) -> Result<&str, IdValidationError> {
        if id.is_empty() {
            return Err(IdValidationError::Empty);
        }
        if id != id.trim() {
            return Err(IdValidationError::SurroundingWhitespace);
        }
        if id.len() > MAX_ID_LENGTH {
            return Err(IdValidationError::TooLong {
                length: id.len(),
                max: MAX_ID_LENGTH,
            });
        }
        if id.contains("..") {
            return Err(IdValidationError::PathTraversal);
        }
        if !id.chars().all(Self::is_valid_char) {
            return Err(IdValidationError::InvalidCharacters);
        }
        Ok(id)
    }

    pub fn is_valid_char(c: char) -> bool {
        c.is_alphanumeric() || matches!(c, '-' | '_' | '.')
    }
}
