//! Pending-task queue.

use kestrel_core::TaskId;
use std::collections::VecDeque;

/// Pending tasks ordered by descending priority, ties in arrival order.
///
/// Insertion places a task after every entry of equal or higher priority,
/// so the queue never needs re-sorting.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    entries: VecDeque<(i32, TaskId)>,
}

impl PendingQueue {
    pub(crate) fn push(&mut self, priority: i32, id: TaskId) {
        let position = self
            .entries
            .iter()
            .position(|(p, _)| *p < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(position, (priority, id));
    }

    pub(crate) fn pop(&mut self) -> Option<TaskId> {
        self.entries.pop_front().map(|(_, id)| id)
    }

    pub(crate) fn remove(&mut self, id: TaskId) -> bool {
        match self.entries.iter().position(|(_, queued)| *queued == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn priorities(&self) -> Vec<i32> {
        self.entries.iter().map(|(p, _)| *p).collect()
    }
}
