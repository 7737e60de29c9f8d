//! # Kestrel Scheduler
//!
//! Priority task scheduling under a concurrency cap.
//!
//! Tasks wait in a priority queue (higher first, ties in submission order).
//! A dispatcher task started by [`TaskScheduler::start`] moves them to
//! `running` while a semaphore permit is available and runs each handler on
//! its own tokio task. A failing or panicking handler marks its task
//! `failed`; it never stops the dispatcher.
//!
//! The scheduler also keeps a table of named recurring jobs, independent of
//! the queue, which are aborted by [`TaskScheduler::release`].

mod config;
mod error;
mod metrics;
mod queue;
mod scheduler;
mod task;

pub use config::{DEFAULT_MAX_CONCURRENT_TASKS, MAX_CONCURRENT_TASKS_LIMIT, SchedulerConfig};
pub use error::SchedulerError;
pub use metrics::SchedulerMetrics;
pub use scheduler::TaskScheduler;
pub use task::{Task, TaskHandler, TaskStatus};
