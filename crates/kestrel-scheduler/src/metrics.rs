//! Scheduler metrics snapshot.

use serde::Serialize;

/// Point-in-time counters of a scheduler.
///
/// `pending` and `running` are current; the `total_*`, `completed` and
/// `failed` counters accumulate since creation and are not reduced by
/// cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerMetrics {
    pub pending: usize,
    pub running: usize,
    pub completed: u64,
    pub failed: u64,
    pub total_submitted: u64,
    pub total_cancelled: u64,
    pub max_concurrent: usize,
}
