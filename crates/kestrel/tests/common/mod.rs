//! Shared helpers for runtime integration tests.

#![allow(dead_code)]

use kestrel::{AgentRuntime, RuntimeConfig, TaskId, TaskStatus};
use std::future::Future;
use std::time::Duration;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub async fn runtime_with(config: RuntimeConfig) -> AgentRuntime {
    AgentRuntime::initialize(config)
        .await
        .expect("runtime should initialize")
}

pub async fn runtime_with_cap(max_concurrent_tasks: usize) -> AgentRuntime {
    let config = RuntimeConfig::builder()
        .max_concurrent_tasks(max_concurrent_tasks)
        .build()
        .expect("valid config");
    runtime_with(config).await
}

/// Poll `condition` until it holds, failing the test after [`TIMEOUT`].
pub async fn eventually<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let result = tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {what}");
}

pub fn status(runtime: &AgentRuntime, id: TaskId) -> Option<TaskStatus> {
    runtime.get_task_status(id).map(|task| task.status)
}

pub async fn with_timeout<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(TIMEOUT, future)
        .await
        .expect("operation timed out")
}
