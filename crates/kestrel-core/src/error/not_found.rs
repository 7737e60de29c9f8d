//! Lookup misses.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The class of resource a lookup was performed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Model,
    Tool,
    Task,
    Session,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Model => "model",
            Self::Tool => "tool",
            Self::Task => "task",
            Self::Session => "session",
        };
        f.write_str(name)
    }
}

/// A model, tool, task or session that does not exist.
///
/// Lookups surface this as a typed value; it is never a reason to crash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} not found: {id}")]
pub struct NotFound {
    pub kind: ResourceKind,
    pub id: String,
}

impl NotFound {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn model(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Model, id)
    }

    pub fn tool(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Tool, id)
    }

    pub fn task(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Task, id)
    }

    pub fn session(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Session, id)
    }
}
