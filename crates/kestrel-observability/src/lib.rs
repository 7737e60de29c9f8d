//! # Kestrel Observability
//!
//! Logging setup and runtime metrics.
//!
//! - [`trace::init_tracing`] installs a `tracing-subscriber` registry with
//!   an `EnvFilter` and JSON or human-readable output.
//! - [`metrics::RuntimeMetrics`] owns a Prometheus registry with tool, task
//!   and session metrics, rendered in the text exposition format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "metrics")]
pub mod metrics;

#[cfg(feature = "tracing")]
pub mod trace;

#[cfg(feature = "metrics")]
pub use metrics::{MetricsError, RuntimeMetrics, TaskGauges, UNREGISTERED_TOOL};

#[cfg(feature = "tracing")]
pub use trace::init_tracing;

/// Latency buckets in seconds, from 5ms to 10s.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, // 5ms
    0.01,  // 10ms
    0.02,  // 20ms
    0.05,  // 50ms
    0.1,   // 100ms
    0.2,   // 200ms
    0.5,   // 500ms
    1.0,   // 1s
    2.5,   // 2.5s
    5.0,   // 5s
    10.0,  // 10s
];

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            _ => Err(format!(
                "Invalid log format '{}'. Valid values: 'json', 'pretty'",
                s
            )),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Pretty => write!(f, "pretty"),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub log_level: String,
    pub log_format: LogFormat,
    /// Collect Prometheus metrics.
    pub metrics_enabled: bool,
    /// Metric name prefix.
    pub namespace: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_enabled: true,
            namespace: "kestrel".to_string(),
        }
    }
}

/// Observability setup errors.
#[derive(thiserror::Error, Debug)]
pub enum ObservabilityError {
    #[error("Tracing initialization failed: {0}")]
    TracingInit(String),
}
