//! Scheduler configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default concurrency cap.
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 4;
/// Upper bound accepted for the concurrency cap.
pub const MAX_CONCURRENT_TASKS_LIMIT: usize = 1_000;

/// Tunables of the task scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of tasks allowed in `running` at once.
    pub max_concurrent_tasks: usize,
    /// How long completed and failed tasks are kept.
    pub task_retention_secs: u64,
    /// Period of the `task-cleanup` maintenance job.
    pub cleanup_interval_secs: u64,
}

impl SchedulerConfig {
    pub fn with_max_concurrent(max_concurrent_tasks: usize) -> Self {
        Self {
            max_concurrent_tasks,
            ..Self::default()
        }
    }

    pub fn task_retention(&self) -> Duration {
        Duration::from_secs(self.task_retention_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            task_retention_secs: 3600,
            cleanup_interval_secs: 300,
        }
    }
}
