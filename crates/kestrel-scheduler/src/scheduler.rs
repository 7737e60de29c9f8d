//! The scheduler itself.

use chrono::Utc;
use futures::FutureExt;
use kestrel_core::{TaskError, TaskId};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::metrics::SchedulerMetrics;
use crate::queue::PendingQueue;
use crate::task::{Task, TaskHandler, TaskStatus};

struct TaskEntry {
    task: Task,
    handler: Option<TaskHandler>,
}

#[derive(Default)]
struct SchedulerState {
    tasks: HashMap<TaskId, TaskEntry>,
    queue: PendingQueue,
    running: usize,
    completed: u64,
    failed: u64,
    total_submitted: u64,
    total_cancelled: u64,
}

struct Shared {
    state: Mutex<SchedulerState>,
    permits: Arc<Semaphore>,
    wake: Notify,
    completions: watch::Sender<u64>,
    max_concurrent: usize,
    shut_down: AtomicBool,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start pending tasks until the queue is empty or no permit is left.
    fn dispatch_ready(self: &Arc<Self>) {
        loop {
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                return;
            };

            let next = {
                let mut state = self.state();
                let next = state.queue.pop().and_then(|id| {
                    let entry = state.tasks.get_mut(&id)?;
                    let handler = entry.handler.take()?;
                    entry.task.start();
                    Some((id, entry.task.name.clone(), handler))
                });
                if next.is_some() {
                    state.running += 1;
                }
                next
            };

            let Some((id, name, handler)) = next else {
                return;
            };
            debug!(task_id = %id, task = %name, "Dispatching task");
            self.run(id, name, handler, permit);
        }
    }

    fn run(
        self: &Arc<Self>,
        id: TaskId,
        name: String,
        handler: TaskHandler,
        permit: OwnedSemaphorePermit,
    ) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = match tokio::spawn(handler).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => Err(TaskError::new(format!(
                    "task panicked: {}",
                    panic_message(e.into_panic())
                ))),
                Err(e) => Err(TaskError::new(format!("task aborted: {e}"))),
            };

            if let Err(error) = &outcome {
                warn!(task_id = %id, task = %name, error = %error, "Task failed");
            } else {
                debug!(task_id = %id, task = %name, "Task completed");
            }
            shared.finish(id, outcome);

            drop(permit);
            shared.completions.send_modify(|count| *count += 1);
            shared.wake.notify_one();
        });
    }

    fn finish(&self, id: TaskId, outcome: Result<Value, TaskError>) {
        let mut state = self.state();
        state.running = state.running.saturating_sub(1);
        if outcome.is_ok() {
            state.completed += 1;
        } else {
            state.failed += 1;
        }
        if let Some(entry) = state.tasks.get_mut(&id) {
            entry.task.finish(outcome);
        }
    }
}

/// Priority task scheduler with a concurrency cap.
///
/// ```rust
/// use kestrel_scheduler::{SchedulerConfig, TaskScheduler, TaskStatus};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let scheduler = TaskScheduler::new(SchedulerConfig::with_max_concurrent(2));
/// scheduler.start();
///
/// let id = scheduler
///     .submit("answer", 0, async { Ok(json!(42)) })
///     .unwrap();
/// let task = scheduler.wait_for_task(id).await.unwrap();
/// assert_eq!(task.status, TaskStatus::Completed);
/// assert_eq!(task.result, Some(json!(42)));
/// # });
/// ```
pub struct TaskScheduler {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    jobs: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TaskScheduler {
    /// Create a scheduler. Nothing is dispatched until [`start`](Self::start).
    pub fn new(config: SchedulerConfig) -> Self {
        let max_concurrent = config.max_concurrent_tasks.max(1);
        let (completions, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState::default()),
                permits: Arc::new(Semaphore::new(max_concurrent)),
                wake: Notify::new(),
                completions,
                max_concurrent,
                shut_down: AtomicBool::new(false),
            }),
            dispatcher: Mutex::new(None),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn the dispatcher. Must be called from within a tokio runtime;
    /// calling it again is a no-op.
    pub fn start(&self) {
        if self.is_shut_down() {
            return;
        }
        let mut dispatcher = lock(&self.dispatcher);
        if dispatcher.is_some() {
            return;
        }

        let shared = Arc::clone(&self.shared);
        *dispatcher = Some(tokio::spawn(async move {
            loop {
                shared.dispatch_ready();
                shared.wake.notified().await;
            }
        }));
        info!(max_concurrent = self.shared.max_concurrent, "Task scheduler started");
    }

    /// Queue a task and trigger dispatch.
    pub fn submit<F>(
        &self,
        name: impl Into<String>,
        priority: i32,
        handler: F,
    ) -> Result<TaskId, SchedulerError>
    where
        F: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        self.submit_boxed(name.into(), priority, handler.boxed())
    }

    pub fn submit_boxed(
        &self,
        name: String,
        priority: i32,
        handler: TaskHandler,
    ) -> Result<TaskId, SchedulerError> {
        if self.is_shut_down() {
            return Err(SchedulerError::ShutDown);
        }

        let task = Task::pending(name, priority);
        let id = task.id;
        {
            let mut state = self.shared.state();
            state.queue.push(priority, id);
            state.total_submitted += 1;
            debug!(task_id = %id, task = %task.name, priority, "Submitted task");
            state.tasks.insert(
                id,
                TaskEntry {
                    task,
                    handler: Some(handler),
                },
            );
        }
        self.shared.wake.notify_one();
        Ok(id)
    }

    /// Snapshot of a task, or `None` if it is unknown or has been removed.
    pub fn task_status(&self, id: TaskId) -> Option<Task> {
        self.shared
            .state()
            .tasks
            .get(&id)
            .map(|entry| entry.task.clone())
    }

    /// Wait until a task is completed or failed.
    ///
    /// Returns `None` if the task is unknown or is removed while waiting.
    /// Once the scheduler is released a pending task can no longer start, so
    /// its pending snapshot is returned instead.
    pub async fn wait_for_task(&self, id: TaskId) -> Option<Task> {
        let mut completions = self.shared.completions.subscribe();
        loop {
            let task = self.task_status(id)?;
            if task.status.is_terminal()
                || (task.status == TaskStatus::Pending && self.is_shut_down())
            {
                return Some(task);
            }
            if completions.changed().await.is_err() {
                return self.task_status(id);
            }
        }
    }

    /// Remove a task if it is still pending.
    ///
    /// Running and finished tasks are left untouched and `false` is returned.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut state = self.shared.state();
        let pending = state
            .tasks
            .get(&id)
            .is_some_and(|entry| entry.task.status == TaskStatus::Pending);
        if !pending {
            return false;
        }

        state.tasks.remove(&id);
        state.queue.remove(id);
        state.total_cancelled += 1;
        debug!(task_id = %id, "Cancelled task");
        true
    }

    /// Remove completed and failed tasks whose `completed_at` is at least
    /// `max_age` ago. Returns how many were removed.
    pub fn cleanup_completed_tasks(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let mut state = self.shared.state();
        let before = state.tasks.len();
        state.tasks.retain(|_, entry| {
            let task = &entry.task;
            let expired = task.status.is_terminal()
                && task
                    .completed_at
                    .and_then(|at| (now - at).to_std().ok())
                    .is_some_and(|age| age >= max_age);
            !expired
        });
        let removed = before - state.tasks.len();
        if removed > 0 {
            debug!(removed, "Cleaned up finished tasks");
        }
        removed
    }

    /// Run `job` every `period`, first after one period has elapsed.
    ///
    /// A job with the same name is replaced.
    pub fn schedule_recurring<F, Fut>(
        &self,
        name: impl Into<String>,
        period: Duration,
        job: F,
    ) -> Result<(), SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        if self.is_shut_down() {
            return Err(SchedulerError::ShutDown);
        }
        if period.is_zero() {
            return Err(SchedulerError::InvalidInterval { job: name });
        }

        let job_name = name.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                debug!(job = %job_name, "Running recurring job");
                job().await;
            }
        });

        if let Some(previous) = lock(&self.jobs).insert(name.clone(), handle) {
            previous.abort();
        }
        info!(job = %name, period_secs = period.as_secs_f64(), "Scheduled recurring job");
        Ok(())
    }

    /// Stop a recurring job; returns whether it existed.
    pub fn cancel_recurring(&self, name: &str) -> bool {
        match lock(&self.jobs).remove(name) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn recurring_jobs(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.jobs).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        let state = self.shared.state();
        SchedulerMetrics {
            pending: state.queue.len(),
            running: state.running,
            completed: state.completed,
            failed: state.failed,
            total_submitted: state.total_submitted,
            total_cancelled: state.total_cancelled,
            max_concurrent: self.shared.max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.shared.max_concurrent
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shut_down.load(Ordering::Acquire)
    }

    /// Stop the dispatcher and every recurring job.
    ///
    /// Running tasks finish on their own; pending tasks stay pending. Later
    /// submissions fail with [`SchedulerError::ShutDown`]. Idempotent.
    pub fn release(&self) {
        if self.shared.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(dispatcher) = lock(&self.dispatcher).take() {
            dispatcher.abort();
        }
        let jobs: Vec<(String, JoinHandle<()>)> = lock(&self.jobs).drain().collect();
        for (name, handle) in &jobs {
            handle.abort();
            debug!(job = %name, "Cancelled recurring job");
        }
        self.shared.completions.send_modify(|count| *count += 1);
        info!(recurring_jobs = jobs.len(), "Task scheduler released");
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        if let Some(dispatcher) = lock(&self.dispatcher).take() {
            dispatcher.abort();
        }
        for (_, handle) in lock(&self.jobs).drain() {
            handle.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(message) => *message,
        Err(panic) => match panic.downcast::<&str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    }
}
