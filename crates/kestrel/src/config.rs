//! Runtime configuration.
//!
//! [`RuntimeConfig`] is the validated object the runtime is built from. It
//! deserializes from any serde format, and [`RuntimeConfigBuilder::from_env`]
//! overlays tunables from `KESTREL_*` environment variables:
//!
//! | variable | field |
//! |---|---|
//! | `KESTREL_MAX_CONCURRENT_TASKS` | `scheduler.max_concurrent_tasks` |
//! | `KESTREL_TASK_RETENTION_SECS` | `scheduler.task_retention_secs` |
//! | `KESTREL_TASK_CLEANUP_INTERVAL_SECS` | `scheduler.cleanup_interval_secs` |
//! | `KESTREL_SESSION_TTL_SECS` | `memory.session_ttl_secs` |
//! | `KESTREL_SESSION_CLEANUP_INTERVAL_SECS` | `memory.cleanup_interval_secs` |
//! | `KESTREL_SEARCH_LIMIT` | `memory.default_search_limit` |
//! | `KESTREL_EMBEDDING_MODEL` | `memory.vector_store.embedding_model` |
//! | `KESTREL_SESSION_DIR` | `memory.persistence_dir` |
//! | `KESTREL_LOG_LEVEL` | `observability.log_level` |
//! | `KESTREL_LOG_FORMAT` | `observability.log_format` |
//! | `KESTREL_METRICS_ENABLED` | `observability.metrics_enabled` |

use kestrel_core::ModelDescriptor;
use kestrel_observability::{LogFormat, ObservabilityConfig};
use kestrel_scheduler::{MAX_CONCURRENT_TASKS_LIMIT, SchedulerConfig};
use kestrel_tools::ToolDescriptor;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Semantic index settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Name of a registered embedding model.
    pub embedding_model: String,
}

/// Memory manager settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Sessions idle for longer than this are removed by `session-cleanup`.
    pub session_ttl_secs: u64,
    /// Period of the `session-cleanup` maintenance job.
    pub cleanup_interval_secs: u64,
    /// Limit used by `search_memory` when the caller passes none.
    pub default_search_limit: usize,
    pub vector_store: Option<VectorStoreConfig>,
    /// Directory of the JSON session store; persistence is off when unset.
    pub persistence_dir: Option<PathBuf>,
}

impl MemoryConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 3600,
            cleanup_interval_secs: 3600,
            default_search_limit: 5,
            vector_store: None,
            persistence_dir: None,
        }
    }
}

/// Everything needed to initialize an [`AgentRuntime`](crate::AgentRuntime).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub models: Vec<ModelDescriptor>,
    pub tools: Vec<ToolDescriptor>,
    pub scheduler: SchedulerConfig,
    pub memory: MemoryConfig,
    pub observability: ObservabilityConfig,
}

impl RuntimeConfig {
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Check tunables are within range.
    ///
    /// Model and tool descriptors are checked later, when they are registered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max = self.scheduler.max_concurrent_tasks;
        if max == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler.max_concurrent_tasks must be at least 1".to_string(),
            ));
        }
        if max > MAX_CONCURRENT_TASKS_LIMIT {
            return Err(ConfigError::ValidationError(format!(
                "scheduler.max_concurrent_tasks must be at most {MAX_CONCURRENT_TASKS_LIMIT}"
            )));
        }
        if self.scheduler.cleanup_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler.cleanup_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.memory.cleanup_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "memory.cleanup_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.memory.default_search_limit == 0 {
            return Err(ConfigError::ValidationError(
                "memory.default_search_limit must be greater than 0".to_string(),
            ));
        }
        if let Some(vector_store) = &self.memory.vector_store
            && vector_store.embedding_model.trim().is_empty()
        {
            return Err(ConfigError::ValidationError(
                "memory.vector_store.embedding_model cannot be empty".to_string(),
            ));
        }
        if self.observability.namespace.is_empty() {
            return Err(ConfigError::ValidationError(
                "observability.namespace cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`RuntimeConfig`] with environment variable support.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    /// Start from defaults and apply `KESTREL_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if a variable is set to a value
    /// that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env(|key| env::var(key).ok())
    }

    /// Overlay values from `lookup`, which maps a variable name to its value.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvSource(lookup);

        if let Some(max) = env.usize("KESTREL_MAX_CONCURRENT_TASKS")? {
            self = self.max_concurrent_tasks(max);
        }
        if let Some(secs) = env.u64("KESTREL_TASK_RETENTION_SECS")? {
            self = self.task_retention_secs(secs);
        }
        if let Some(secs) = env.u64("KESTREL_TASK_CLEANUP_INTERVAL_SECS")? {
            self = self.task_cleanup_interval_secs(secs);
        }
        if let Some(secs) = env.u64("KESTREL_SESSION_TTL_SECS")? {
            self = self.session_ttl_secs(secs);
        }
        if let Some(secs) = env.u64("KESTREL_SESSION_CLEANUP_INTERVAL_SECS")? {
            self = self.session_cleanup_interval_secs(secs);
        }
        if let Some(limit) = env.usize("KESTREL_SEARCH_LIMIT")? {
            self = self.default_search_limit(limit);
        }
        if let Some(model) = env.string("KESTREL_EMBEDDING_MODEL") {
            self = self.embedding_model(model);
        }
        if let Some(dir) = env.string("KESTREL_SESSION_DIR") {
            self = self.persistence_dir(dir);
        }
        if let Some(level) = env.string("KESTREL_LOG_LEVEL") {
            self = self.log_level(level);
        }
        if let Some(format) = env.string("KESTREL_LOG_FORMAT") {
            let format = format
                .parse::<LogFormat>()
                .map_err(|message| ConfigError::InvalidEnvVar {
                    key: "KESTREL_LOG_FORMAT".to_string(),
                    message,
                })?;
            self = self.log_format(format);
        }
        if let Some(enabled) = env.bool("KESTREL_METRICS_ENABLED")? {
            self = self.metrics_enabled(enabled);
        }

        Ok(self)
    }

    /// Start from an existing configuration, e.g. one read from a file.
    pub fn with_base(config: RuntimeConfig) -> Self {
        Self { config }
    }

    pub fn model(mut self, descriptor: ModelDescriptor) -> Self {
        self.config.models.push(descriptor);
        self
    }

    pub fn tool(mut self, descriptor: ToolDescriptor) -> Self {
        self.config.tools.push(descriptor);
        self
    }

    pub fn max_concurrent_tasks(mut self, max: usize) -> Self {
        self.config.scheduler.max_concurrent_tasks = max;
        self
    }

    pub fn task_retention_secs(mut self, secs: u64) -> Self {
        self.config.scheduler.task_retention_secs = secs;
        self
    }

    pub fn task_cleanup_interval_secs(mut self, secs: u64) -> Self {
        self.config.scheduler.cleanup_interval_secs = secs;
        self
    }

    pub fn session_ttl_secs(mut self, secs: u64) -> Self {
        self.config.memory.session_ttl_secs = secs;
        self
    }

    pub fn session_cleanup_interval_secs(mut self, secs: u64) -> Self {
        self.config.memory.cleanup_interval_secs = secs;
        self
    }

    pub fn default_search_limit(mut self, limit: usize) -> Self {
        self.config.memory.default_search_limit = limit;
        self
    }

    /// Enable the semantic index backed by the named embedding model.
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.config.memory.vector_store = Some(VectorStoreConfig {
            embedding_model: model.into(),
        });
        self
    }

    pub fn persistence_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.memory.persistence_dir = Some(dir.into());
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.observability.log_level = level.into();
        self
    }

    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.config.observability.log_format = format;
        self
    }

    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.config.observability.metrics_enabled = enabled;
        self
    }

    /// Validate and return the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the configuration is invalid.
    pub fn build(self) -> Result<RuntimeConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

struct EnvSource<F>(F);

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.string(key) {
            Some(val) => match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Some(true)),
                "false" | "0" | "no" | "off" => Ok(Some(false)),
                _ => Err(ConfigError::InvalidEnvVar {
                    key: key.to_string(),
                    message: format!(
                        "invalid boolean value '{val}', expected true/false/1/0/yes/no/on/off"
                    ),
                }),
            },
            None => Ok(None),
        }
    }

    fn u64(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        self.parsed(key, "u64")
    }

    fn usize(&self, key: &str) -> Result<Option<usize>, ConfigError> {
        self.parsed(key, "usize")
    }

    fn parsed<T>(&self, key: &str, type_name: &str) -> Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(key) {
            Some(val) => val
                .parse::<T>()
                .map(Some)
                .map_err(|e| ConfigError::InvalidEnvVar {
                    key: key.to_string(),
                    message: format!("invalid {type_name} value '{val}': {e}"),
                }),
            None => Ok(None),
        }
    }
}
