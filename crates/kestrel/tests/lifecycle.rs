//! Initialization, shutdown and metrics export.

mod common;

use common::{runtime_with, with_timeout};
use kestrel::{
    AgentRuntime, AgentRuntimeBuilder, Message, ModelKind, ModelStatus, RuntimeConfig,
    RuntimeConfigBuilder, RuntimeError, TaskStatus, ToolDescriptor, ToolHandler,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;

fn config_from_json() -> RuntimeConfig {
    serde_json::from_value(json!({
        "models": [
            {"name": "embed", "kind": "embedding", "provider": "hashing", "dimensions": 32},
            {"name": "chat", "kind": "generative", "model_id": "local-chat"}
        ],
        "tools": [
            {"name": "echo", "handler": "builtin.echo"},
            {"name": "upper", "handler": "builtin.text_uppercase"}
        ],
        "scheduler": {"max_concurrent_tasks": 2},
        "memory": {"vector_store": {"embedding_model": "embed"}}
    }))
    .unwrap()
}

#[tokio::test]
async fn test_initialize_from_serialized_config() {
    let runtime = runtime_with(config_from_json()).await;

    assert_eq!(runtime.available_tools(), vec!["echo", "upper"]);
    assert_eq!(runtime.model_names(), vec!["chat", "embed"]);
    assert_eq!(runtime.get_model("embed").unwrap().kind(), ModelKind::Embedding);
    assert_eq!(runtime.get_model("chat").unwrap().kind(), ModelKind::Generative);
    assert!(runtime.get_model("vision").is_err());
    assert!(runtime.memory().has_vector_store());
    assert_eq!(runtime.scheduler_metrics().max_concurrent, 2);

    let upper = runtime.invoke_tool("upper", json!({"text": "quiet"})).await;
    assert_eq!(upper.data, Some(json!({"text": "QUIET"})));

    let schema = runtime.tool_config("upper").unwrap().parameter_schema;
    assert!(schema.is_some());

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_config_overlay_from_environment_lookup() {
    let config = RuntimeConfigBuilder::with_base(config_from_json())
        .apply_env(|key| match key {
            "KESTREL_MAX_CONCURRENT_TASKS" => Some("7".to_string()),
            "KESTREL_SESSION_TTL_SECS" => Some("120".to_string()),
            _ => None,
        })
        .unwrap()
        .build()
        .unwrap();

    let runtime = runtime_with(config).await;
    assert_eq!(runtime.scheduler_metrics().max_concurrent, 7);
    assert_eq!(runtime.config().memory.session_ttl_secs, 120);
    assert_eq!(runtime.available_tools().len(), 2);
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_tool_name_is_rejected() {
    let config = RuntimeConfig::builder()
        .tool(ToolDescriptor::new("echo", "builtin.echo"))
        .tool(ToolDescriptor::new("echo", "builtin.json_parse"))
        .build()
        .unwrap();

    let err = AgentRuntime::initialize(config).await.err().unwrap();
    assert_eq!(err.error_code(), "DUPLICATE");
}

#[tokio::test]
async fn test_shutdown_runs_release_hooks_and_lets_running_tasks_finish() {
    let released = Arc::new(AtomicUsize::new(0));
    let hook = Arc::clone(&released);
    let config = RuntimeConfig::builder()
        .max_concurrent_tasks(1)
        .tool(ToolDescriptor::new("pool", "custom.pool"))
        .build()
        .unwrap();
    let runtime = AgentRuntimeBuilder::new(config)
        .with_handler(
            "custom.pool",
            ToolHandler::from_fn(|_params: Value| async { Ok(json!("ok")) }).with_release(
                move || {
                    let hook = Arc::clone(&hook);
                    async move {
                        hook.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
            ),
        )
        .initialize()
        .await
        .unwrap();
    let (release, gate) = oneshot::channel::<()>();
    let running = runtime
        .submit_task("in-flight", 1, async move {
            let _ = gate.await;
            Ok(json!("finished"))
        })
        .unwrap();
    let pending = runtime
        .submit_task("never", 0, async { Ok(Value::Null) })
        .unwrap();
    common::eventually("task to start", || {
        common::status(&runtime, running) == Some(TaskStatus::Running)
    })
    .await;

    runtime.shutdown().await;
    assert!(runtime.is_shut_down());
    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert!(runtime.available_tools().is_empty());
    assert!(runtime.scheduler().recurring_jobs().is_empty());

    let late = runtime.submit_task("late", 0, async { Ok(Value::Null) });
    assert!(matches!(late, Err(RuntimeError::Scheduler(_))));

    release.send(()).unwrap();
    let done = with_timeout(runtime.wait_for_task(running)).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.result, Some(json!("finished")));
    assert_eq!(common::status(&runtime, pending), Some(TaskStatus::Pending));
    let stranded = with_timeout(runtime.wait_for_task(pending)).await.unwrap();
    assert_eq!(stranded.status, TaskStatus::Pending);

    runtime.shutdown().await;
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_models_are_released_on_shutdown() {
    let runtime = runtime_with(config_from_json()).await;
    let handle = runtime.get_model("chat").unwrap();
    assert_eq!(handle.status(), ModelStatus::Ready);

    runtime.shutdown().await;

    assert_eq!(handle.status(), ModelStatus::Released);
    assert!(runtime.get_model("chat").is_err());
    assert!(runtime.model_names().is_empty());
}

#[tokio::test]
async fn test_export_metrics_reports_tools_tasks_and_sessions() {
    let runtime = runtime_with(config_from_json()).await;

    runtime.invoke_tool("echo", json!({"a": 1})).await;
    runtime.invoke_tool("upper", json!({})).await;
    runtime.invoke_tool("nope", json!({})).await;
    let id = runtime
        .submit_task("work", 0, async { Ok(Value::Null) })
        .unwrap();
    with_timeout(runtime.wait_for_task(id)).await;
    runtime.append_message("s1", Message::user("hi")).await;

    let text = runtime.export_metrics().unwrap();
    assert!(text.contains("kestrel_tool_exec_total"));
    assert!(text.contains(r#"tool="echo""#));
    assert!(text.contains(r#"outcome="failure""#));
    assert!(text.contains(r#"tool="_unregistered""#));
    assert!(!text.contains(r#"tool="nope""#));
    assert!(text.contains("kestrel_tool_exec_duration_seconds"));
    assert!(text.contains("kestrel_tasks_submitted_total 1"));
    assert!(text.contains(r#"kestrel_tasks{state="completed"} 1"#));
    assert!(text.contains("kestrel_sessions_active 1"));

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_maintenance_jobs_expire_tasks_and_sessions() {
    let config = RuntimeConfig::builder()
        .task_retention_secs(0)
        .task_cleanup_interval_secs(60)
        .session_ttl_secs(0)
        .session_cleanup_interval_secs(60)
        .build()
        .unwrap();
    let runtime = runtime_with(config).await;

    let id = runtime
        .submit_task("short", 0, async { Ok(Value::Null) })
        .unwrap();
    with_timeout(runtime.wait_for_task(id)).await;
    runtime.append_message("s1", Message::user("hi")).await;
    assert!(runtime.get_task_status(id).is_some());

    tokio::time::sleep(Duration::from_secs(61)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert!(runtime.get_task_status(id).is_none());
    assert!(runtime.get_messages("s1", None).is_empty());

    runtime.shutdown().await;
}
