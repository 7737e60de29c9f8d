//! Task records.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use kestrel_core::{TaskError, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Work run by the scheduler.
pub type TaskHandler = BoxFuture<'static, Result<Value, TaskError>>;

/// Lifecycle state of a task.
///
/// `Pending -> Running -> Completed | Failed`. A cancelled task is removed
/// rather than given a state of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(status)
    }
}

/// Snapshot of a task as seen by status reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub priority: i32,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl Task {
    pub(crate) fn pending(name: String, priority: i32) -> Self {
        Self {
            id: TaskId::new(),
            name,
            priority,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub(crate) fn start(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn finish(&mut self, outcome: Result<Value, TaskError>) {
        self.completed_at = Some(Utc::now());
        match outcome {
            Ok(value) => {
                self.status = TaskStatus::Completed;
                self.result = Some(value);
            }
            Err(error) => {
                self.status = TaskStatus::Failed;
                self.error = Some(error.to_string());
            }
        }
    }
}
