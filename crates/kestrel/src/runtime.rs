//! The agent runtime facade.

use kestrel_core::{
    ConfigurationError, EmbeddingFactory, Message, ModelHandle, ModelRegistry, NotFound, TaskError,
    TaskId,
};
use kestrel_memory::{FileSessionStore, InMemoryVectorStore, MemoryManager, SessionStore, VectorStore};
use kestrel_observability::{RuntimeMetrics, TaskGauges, UNREGISTERED_TOOL};
use kestrel_scheduler::{SchedulerMetrics, Task, TaskScheduler};
use kestrel_tools::{HandlerCatalog, ToolDescriptor, ToolHandler, ToolRegistry, ToolResult};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::error::{RuntimeError, RuntimeResult};

/// Name of the recurring job that drops old finished tasks.
pub const TASK_CLEANUP_JOB: &str = "task-cleanup";
/// Name of the recurring job that drops idle sessions.
pub const SESSION_CLEANUP_JOB: &str = "session-cleanup";

/// Collects pluggable parts before [`initialize`](Self::initialize).
pub struct AgentRuntimeBuilder {
    config: RuntimeConfig,
    catalog: HandlerCatalog,
    providers: Vec<(String, EmbeddingFactory)>,
    session_store: Option<Arc<dyn SessionStore>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    install_tracing: bool,
}

impl AgentRuntimeBuilder {
    /// Builder over the built-in handler catalog.
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            catalog: HandlerCatalog::with_builtins(),
            providers: Vec::new(),
            session_store: None,
            vector_store: None,
            install_tracing: false,
        }
    }

    /// Make `handler` resolvable under `key` by tool descriptors.
    pub fn with_handler(mut self, key: impl Into<String>, handler: ToolHandler) -> Self {
        self.catalog.insert(key, handler);
        self
    }

    /// Replace the handler catalog entirely.
    pub fn with_catalog(mut self, catalog: HandlerCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Register an embedding provider that model descriptors can name.
    pub fn with_embedding_provider(
        mut self,
        name: impl Into<String>,
        factory: EmbeddingFactory,
    ) -> Self {
        self.providers.push((name.into(), factory));
        self
    }

    /// Persist sessions to `store` instead of `memory.persistence_dir`.
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Index messages in `store` instead of the in-memory vector store.
    ///
    /// Only takes effect when `memory.vector_store` names an embedding model.
    pub fn with_vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Install the global tracing subscriber from `observability` settings.
    pub fn with_tracing(mut self) -> Self {
        self.install_tracing = true;
        self
    }

    /// Bring every component up, in dependency order.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid tunable, model or tool descriptor, on an
    /// unusable persistence directory, or if the metrics registry cannot be
    /// created. Nothing is left running on failure.
    pub async fn initialize(self) -> RuntimeResult<AgentRuntime> {
        let Self {
            config,
            catalog,
            providers,
            session_store,
            vector_store,
            install_tracing,
        } = self;

        config.validate()?;

        if install_tracing
            && let Err(e) = kestrel_observability::init_tracing(&config.observability)
        {
            debug!(error = %e, "Tracing subscriber not installed");
        }

        let models = ModelRegistry::new();
        for (name, factory) in providers {
            models.register_provider(name, factory);
        }
        for descriptor in &config.models {
            models.register_model(&descriptor.name, descriptor.config.clone())?;
        }

        let tools = Arc::new(ToolRegistry::new(catalog));
        for descriptor in &config.tools {
            tools.register_tool(descriptor.clone())?;
        }

        let memory = Arc::new(build_memory(&config, &models, session_store, vector_store)?);

        let metrics = if config.observability.metrics_enabled {
            Some(RuntimeMetrics::new(&config.observability.namespace)?)
        } else {
            None
        };

        let scheduler = Arc::new(TaskScheduler::new(config.scheduler.clone()));
        scheduler.start();
        install_maintenance_jobs(&config, &scheduler, &memory)?;

        info!(
            models = config.models.len(),
            tools = tools.len(),
            max_concurrent = scheduler.max_concurrent(),
            vector_store = memory.has_vector_store(),
            persistence = memory.has_persistence(),
            "Agent runtime initialized"
        );

        Ok(AgentRuntime {
            config,
            models,
            tools,
            memory,
            scheduler,
            metrics,
            shut_down: AtomicBool::new(false),
        })
    }
}

fn build_memory(
    config: &RuntimeConfig,
    models: &ModelRegistry,
    session_store: Option<Arc<dyn SessionStore>>,
    vector_store: Option<Arc<dyn VectorStore>>,
) -> RuntimeResult<MemoryManager> {
    let mut memory = MemoryManager::new();

    if let Some(settings) = &config.memory.vector_store {
        let handle = models.get_model(&settings.embedding_model).map_err(|_| {
            ConfigurationError::invalid_value(
                "memory.vector_store",
                format!("embedding model '{}' is not registered", settings.embedding_model),
            )
        })?;
        let embedder = handle.embedding_model()?;
        let store = vector_store
            .unwrap_or_else(|| Arc::new(InMemoryVectorStore::new()) as Arc<dyn VectorStore>);
        memory = memory.with_vector_store(store, embedder);
    }

    let session_store = match session_store {
        Some(store) => Some(store),
        None => match &config.memory.persistence_dir {
            Some(dir) => Some(Arc::new(FileSessionStore::new(dir)?) as Arc<dyn SessionStore>),
            None => None,
        },
    };
    if let Some(store) = session_store {
        memory = memory.with_session_store(store);
    }

    Ok(memory)
}

fn install_maintenance_jobs(
    config: &RuntimeConfig,
    scheduler: &Arc<TaskScheduler>,
    memory: &Arc<MemoryManager>,
) -> RuntimeResult<()> {
    let retention = config.scheduler.task_retention();
    let weak = Arc::downgrade(scheduler);
    scheduler.schedule_recurring(TASK_CLEANUP_JOB, config.scheduler.cleanup_interval(), move || {
        let scheduler = weak.upgrade();
        async move {
            if let Some(scheduler) = scheduler {
                scheduler.cleanup_completed_tasks(retention);
            }
        }
    })?;

    let ttl = config.memory.session_ttl();
    let sessions = Arc::clone(memory);
    scheduler.schedule_recurring(SESSION_CLEANUP_JOB, config.memory.cleanup_interval(), move || {
        let sessions = Arc::clone(&sessions);
        async move {
            sessions.cleanup_sessions(ttl).await;
        }
    })?;

    Ok(())
}

/// An initialized agent runtime.
///
/// Owns the model registry, tool registry, memory manager and task scheduler
/// for its whole lifetime. Call [`shutdown`](Self::shutdown) before dropping
/// to flush memory backends and run tool release hooks.
pub struct AgentRuntime {
    config: RuntimeConfig,
    models: ModelRegistry,
    tools: Arc<ToolRegistry>,
    memory: Arc<MemoryManager>,
    scheduler: Arc<TaskScheduler>,
    metrics: Option<RuntimeMetrics>,
    shut_down: AtomicBool,
}

impl AgentRuntime {
    /// Initialize a runtime with the built-in handler catalog.
    pub async fn initialize(config: RuntimeConfig) -> RuntimeResult<Self> {
        AgentRuntimeBuilder::new(config).initialize().await
    }

    pub fn builder(config: RuntimeConfig) -> AgentRuntimeBuilder {
        AgentRuntimeBuilder::new(config)
    }

    /// Stop scheduling, flush memory and release tools and models.
    ///
    /// Running tasks are left to finish; pending tasks are never started.
    /// Calling this more than once has no further effect.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down agent runtime");

        self.scheduler.release();
        self.memory.flush().await;
        self.tools.release_tools().await;
        self.models.release_all();

        info!("Agent runtime shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    // Tasks

    /// Queue `handler` as a task; higher `priority` runs first.
    pub fn submit_task<F>(
        &self,
        name: impl Into<String>,
        priority: i32,
        handler: F,
    ) -> RuntimeResult<TaskId>
    where
        F: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        let id = self.scheduler.submit(name, priority, handler)?;
        if let Some(metrics) = &self.metrics {
            metrics.record_task_submitted();
        }
        Ok(id)
    }

    /// Queue a tool invocation as a task.
    ///
    /// The task fails if the tool reports failure, with the tool's error as
    /// the task error.
    pub fn submit_tool_task(
        &self,
        name: impl Into<String>,
        priority: i32,
        tool: impl Into<String>,
        params: Value,
    ) -> RuntimeResult<TaskId> {
        let tools = Arc::clone(&self.tools);
        let metrics = self.metrics.clone();
        let tool = tool.into();
        self.submit_task(name, priority, async move {
            let result = tools.execute_tool(&tool, params).await;
            if let Some(metrics) = &metrics {
                record_tool(metrics, &tools, &result);
            }
            result.into_result().map_err(TaskError::from)
        })
    }

    /// Snapshot of a task, or `None` if unknown, cancelled or cleaned up.
    pub fn get_task_status(&self, id: TaskId) -> Option<Task> {
        self.scheduler.task_status(id)
    }

    /// Like [`get_task_status`](Self::get_task_status), as a typed error.
    pub fn task(&self, id: TaskId) -> Result<Task, NotFound> {
        self.get_task_status(id)
            .ok_or_else(|| NotFound::task(id.to_string()))
    }

    /// Wait until a task completes or fails.
    pub async fn wait_for_task(&self, id: TaskId) -> Option<Task> {
        self.scheduler.wait_for_task(id).await
    }

    /// Remove a task that has not started yet.
    pub fn cancel_task(&self, id: TaskId) -> bool {
        self.scheduler.cancel(id)
    }

    pub fn cleanup_completed_tasks(&self, max_age: Duration) -> usize {
        self.scheduler.cleanup_completed_tasks(max_age)
    }

    pub fn scheduler_metrics(&self) -> SchedulerMetrics {
        self.scheduler.metrics()
    }

    // Tools

    /// Run a tool. Failures come back in the [`ToolResult`], never as an error.
    pub async fn invoke_tool(&self, name: &str, params: Value) -> ToolResult {
        let result = self.tools.execute_tool(name, params).await;
        if let Some(metrics) = &self.metrics {
            record_tool(metrics, &self.tools, &result);
        }
        result
    }

    pub fn available_tools(&self) -> Vec<String> {
        self.tools.available_tools()
    }

    pub fn tool_config(&self, name: &str) -> Option<ToolDescriptor> {
        self.tools.tool_config(name)
    }

    // Models

    pub fn get_model(&self, name: &str) -> Result<Arc<ModelHandle>, NotFound> {
        self.models.get_model(name)
    }

    pub fn model_names(&self) -> Vec<String> {
        self.models.model_names()
    }

    // Memory

    pub async fn append_message(&self, session_id: &str, message: Message) {
        self.memory.add_message(session_id, message).await;
    }

    /// The last `limit` messages of a session in order, or all of them.
    pub fn get_messages(&self, session_id: &str, limit: Option<usize>) -> Vec<Message> {
        self.memory.get_messages(session_id, limit)
    }

    /// Semantic search; `limit` defaults to `memory.default_search_limit`.
    pub async fn search_memory(
        &self,
        query: &str,
        session_id: Option<&str>,
        limit: Option<usize>,
    ) -> Vec<Message> {
        let limit = limit.unwrap_or(self.config.memory.default_search_limit);
        self.memory.search_memory(query, session_id, limit).await
    }

    pub async fn set_session_metadata(&self, session_id: &str, key: &str, value: Value) {
        self.memory.set_session_metadata(session_id, key, value).await;
    }

    pub fn get_session_metadata(&self, session_id: &str, key: &str) -> Option<Value> {
        self.memory.get_session_metadata(session_id, key)
    }

    pub fn session_metadata(&self, session_id: &str) -> Option<Map<String, Value>> {
        self.memory.session_metadata(session_id)
    }

    pub async fn clear_session(&self, session_id: &str) -> bool {
        self.memory.clear_session(session_id).await
    }

    pub async fn cleanup_sessions(&self, max_age: Duration) -> usize {
        self.memory.cleanup_sessions(max_age).await
    }

    pub async fn load_session(&self, session_id: &str) -> bool {
        self.memory.load_session(session_id).await
    }

    /// Load every persisted session; returns how many were restored.
    pub async fn restore_sessions(&self) -> usize {
        self.memory.restore_sessions().await
    }

    // Metrics

    /// Prometheus text exposition of runtime metrics.
    ///
    /// Empty when metrics are disabled.
    pub fn export_metrics(&self) -> RuntimeResult<String> {
        let Some(metrics) = &self.metrics else {
            return Ok(String::new());
        };

        let snapshot = self.scheduler.metrics();
        metrics.set_task_gauges(TaskGauges {
            pending: snapshot.pending,
            running: snapshot.running,
            completed: snapshot.completed,
            failed: snapshot.failed,
        });
        metrics.set_active_sessions(self.memory.session_count());
        metrics.render().map_err(RuntimeError::from)
    }

    // Accessors

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }
}

impl Drop for AgentRuntime {
    fn drop(&mut self) {
        if !self.is_shut_down() {
            warn!("Agent runtime dropped without shutdown");
        }
    }
}

fn record_tool(metrics: &RuntimeMetrics, tools: &ToolRegistry, result: &ToolResult) {
    let label = if tools.tool_config(&result.tool_name).is_some() {
        result.tool_name.as_str()
    } else {
        UNREGISTERED_TOOL
    };
    metrics.record_tool_execution(label, result.success, result.execution_time);
}
