//! Conversation session.

use chrono::{DateTime, Utc};
use kestrel_core::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered message history and metadata for one conversation.
///
/// `messages` is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            messages: Vec::new(),
            metadata: Map::new(),
            created_at: now,
            last_updated: now,
        }
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    /// The most recent `limit` messages in original order, or all of them.
    pub fn recent(&self, limit: Option<usize>) -> Vec<Message> {
        let skip = limit.map_or(0, |limit| self.messages.len().saturating_sub(limit));
        self.messages[skip..].to_vec()
    }
}
