//! Scheduler errors.

/// Errors returned by [`TaskScheduler`](crate::TaskScheduler) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler has been shut down")]
    ShutDown,

    #[error("recurring job '{job}' needs a non-zero interval")]
    InvalidInterval { job: String },
}
