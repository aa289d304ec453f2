//! # Wait Queues
//!
//! Priority-ordered holding structure for tasks blocked on one kernel
//! object. Entries are kept in ascending priority value (most urgent
//! first); among equal priorities, arrival order is preserved.

use heapless::Vec;

use crate::config::MAX_TASKS;
use crate::ipc::{EventId, MutexId, QueueId, SemaphoreId};
use crate::task::{Priority, TaskId};

/// Which wait queue holds a PENDING task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitTarget {
    /// The scheduler's delay queue.
    Delay,
    Semaphore(SemaphoreId),
    Mutex(MutexId),
    Event(EventId),
    Queue(QueueId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WaitEntry {
    task: TaskId,
    priority: Priority,
}

/// A priority-ordered queue of blocked tasks.
#[derive(Debug)]
pub struct WaitQueue {
    entries: Vec<WaitEntry, MAX_TASKS>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert `task` behind every entry of equal or more urgent priority.
    pub fn insert(&mut self, task: TaskId, priority: Priority) {
        let pos = self
            .entries
            .iter()
            .position(|e| priority < e.priority)
            .unwrap_or(self.entries.len());
        if self.entries.insert(pos, WaitEntry { task, priority }).is_err() {
            unreachable!("wait queue sized for MAX_TASKS");
        }
    }

    /// Remove `task` if present. Returns whether it was found.
    pub fn remove(&mut self, task: TaskId) -> bool {
        match self.entries.iter().position(|e| e.task == task) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Update the priority of a queued task and move it to keep the order.
    pub fn reposition(&mut self, task: TaskId, priority: Priority) {
        if self.remove(task) {
            self.insert(task, priority);
        }
    }

    /// The most urgent waiter.
    pub fn head(&self) -> Option<TaskId> {
        self.entries.first().map(|e| e.task)
    }

    /// Waiters in service order.
    pub fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.entries.iter().map(|e| e.task)
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.entries.iter().any(|e| e.task == task)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        WaitQueue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(queue: &WaitQueue) -> Vec<usize, MAX_TASKS> {
        queue.iter().map(|t| t.0).collect()
    }

    #[test]
    fn test_orders_by_priority_then_arrival() {
        let mut q = WaitQueue::new();
        q.insert(TaskId(0), 5);
        q.insert(TaskId(1), 2);
        q.insert(TaskId(2), 5);
        q.insert(TaskId(3), 9);
        q.insert(TaskId(4), 2);

        assert_eq!(ids(&q).as_slice(), &[1, 4, 0, 2, 3]);
        assert_eq!(q.head(), Some(TaskId(1)));
        assert_eq!(q.len(), 5);
    }

    #[test]
    fn test_remove_and_reposition() {
        let mut q = WaitQueue::new();
        q.insert(TaskId(0), 3);
        q.insert(TaskId(1), 4);
        q.insert(TaskId(2), 5);

        assert!(q.remove(TaskId(1)));
        assert!(!q.remove(TaskId(1)));
        assert!(!q.contains(TaskId(1)));

        // Boosted to the front, ties go behind existing entries
        q.reposition(TaskId(2), 3);
        assert_eq!(ids(&q).as_slice(), &[0, 2]);

        // Repositioning an absent task is a no-op
        q.reposition(TaskId(6), 0);
        assert_eq!(ids(&q).as_slice(), &[0, 2]);
    }

    #[test]
    fn test_empty_queue() {
        let q = WaitQueue::default();
        assert!(q.is_empty());
        assert_eq!(q.head(), None);
    }
}
