//! Runtime metrics.
//!
//! Each [`RuntimeMetrics`] owns its own Prometheus registry, so several
//! runtimes in one process (as in tests) do not collide on metric names.
//! Counters are updated as events happen; task and session gauges are set
//! by the runtime right before rendering.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use std::time::Duration;
use thiserror::Error;

use crate::LATENCY_BUCKETS;

/// Label used for invocations of tools that are not registered.
pub const UNREGISTERED_TOOL: &str = "_unregistered";

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Metrics output is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Scheduler counts pushed into gauges at scrape time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskGauges {
    pub pending: usize,
    pub running: usize,
    pub completed: u64,
    pub failed: u64,
}

/// Prometheus metrics of one runtime.
#[derive(Clone)]
pub struct RuntimeMetrics {
    registry: Registry,
    tool_exec_total: IntCounterVec,           // labels: tool, outcome
    tool_exec_duration_seconds: HistogramVec, // labels: tool
    tasks_submitted_total: IntCounter,
    tasks: IntGaugeVec, // labels: state
    sessions_active: IntGauge,
}

impl RuntimeMetrics {
    /// Create metrics under `namespace`.
    pub fn new(namespace: &str) -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let tool_exec_total = IntCounterVec::new(
            Opts::new(
                "tool_exec_total",
                "Total number of tool executions by tool and outcome",
            )
            .namespace(namespace),
            &["tool", "outcome"],
        )?;
        let tool_exec_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "tool_exec_duration_seconds",
                "Tool execution duration in seconds by tool",
            )
            .namespace(namespace)
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["tool"],
        )?;
        let tasks_submitted_total = IntCounter::with_opts(
            Opts::new("tasks_submitted_total", "Total number of submitted tasks")
                .namespace(namespace),
        )?;
        let tasks = IntGaugeVec::new(
            Opts::new("tasks", "Tasks by state; completed and failed are cumulative")
                .namespace(namespace),
            &["state"],
        )?;
        let sessions_active = IntGauge::with_opts(
            Opts::new("sessions_active", "Number of sessions held in memory").namespace(namespace),
        )?;

        registry.register(Box::new(tool_exec_total.clone()))?;
        registry.register(Box::new(tool_exec_duration_seconds.clone()))?;
        registry.register(Box::new(tasks_submitted_total.clone()))?;
        registry.register(Box::new(tasks.clone()))?;
        registry.register(Box::new(sessions_active.clone()))?;

        Ok(Self {
            registry,
            tool_exec_total,
            tool_exec_duration_seconds,
            tasks_submitted_total,
            tasks,
            sessions_active,
        })
    }

    pub fn record_tool_execution(&self, tool: &str, success: bool, elapsed: Duration) {
        let outcome = if success { "success" } else { "failure" };
        self.tool_exec_total
            .with_label_values(&[tool, outcome])
            .inc();
        self.tool_exec_duration_seconds
            .with_label_values(&[tool])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_task_submitted(&self) {
        self.tasks_submitted_total.inc();
    }

    pub fn set_task_gauges(&self, gauges: TaskGauges) {
        let set = |state: &str, value: i64| self.tasks.with_label_values(&[state]).set(value);
        set("pending", to_i64(gauges.pending as u64));
        set("running", to_i64(gauges.running as u64));
        set("completed", to_i64(gauges.completed));
        set("failed", to_i64(gauges.failed));
    }

    pub fn set_active_sessions(&self, count: usize) {
        self.sessions_active.set(to_i64(count as u64));
    }

    /// Render every metric in the Prometheus text format.
    pub fn render(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_values() {
        let metrics = RuntimeMetrics::new("test").unwrap();
        metrics.record_tool_execution("echo", true, Duration::from_millis(12));
        metrics.record_tool_execution("echo", false, Duration::from_millis(1));
        metrics.record_task_submitted();
        metrics.set_task_gauges(TaskGauges {
            pending: 2,
            running: 1,
            completed: 5,
            failed: 1,
        });
        metrics.set_active_sessions(3);

        let output = metrics.render().unwrap();
        assert!(output.contains(r#"test_tool_exec_total{outcome="success",tool="echo"} 1"#));
        assert!(output.contains(r#"test_tool_exec_total{outcome="failure",tool="echo"} 1"#));
        assert!(output.contains("test_tasks_submitted_total 1"));
        assert!(output.contains(r#"test_tasks{state="pending"} 2"#));
        assert!(output.contains("test_sessions_active 3"));
        assert!(output.contains("test_tool_exec_duration_seconds_bucket"));
    }

    #[test]
    fn test_independent_registries() {
        let a = RuntimeMetrics::new("kestrel").unwrap();
        let b = RuntimeMetrics::new("kestrel").unwrap();
        a.record_task_submitted();
        assert!(b.render().unwrap().contains("kestrel_tasks_submitted_total 0"));
    }
}
