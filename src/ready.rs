//! # Ready Structure
//!
//! Priority-bucketed collection of runnable tasks. Each bucket groups the
//! tasks sharing one priority value in FIFO order; buckets are created on
//! first insertion at that priority, dropped when their last task leaves,
//! and kept in ascending priority value.

use heapless::Vec;

use crate::config::MAX_TASKS;
use crate::task::{Priority, TaskId};

#[derive(Debug)]
struct PriorityBucket {
    priority: Priority,
    tasks: Vec<TaskId, MAX_TASKS>,
}

/// The ready structure: every READY or RUNNING task lives here.
#[derive(Debug)]
pub struct ReadyQueue {
    buckets: Vec<PriorityBucket, MAX_TASKS>,
}

impl ReadyQueue {
    pub const fn new() -> Self {
        Self {
            buckets: Vec::new(),
        }
    }

    /// Append `task` to the tail of its priority bucket.
    pub fn insert(&mut self, task: TaskId, priority: Priority) {
        let pos = match self.buckets.iter().position(|b| b.priority >= priority) {
            Some(pos) if self.buckets[pos].priority == priority => pos,
            found => {
                let pos = found.unwrap_or(self.buckets.len());
                let bucket = PriorityBucket {
                    priority,
                    tasks: Vec::new(),
                };
                if self.buckets.insert(pos, bucket).is_err() {
                    unreachable!("ready structure sized for MAX_TASKS buckets");
                }
                pos
            }
        };
        if self.buckets[pos].tasks.push(task).is_err() {
            unreachable!("priority bucket sized for MAX_TASKS");
        }
    }

    /// Remove `task` from the bucket for `priority`. Returns whether it was
    /// found.
    pub fn remove(&mut self, task: TaskId, priority: Priority) -> bool {
        let Some(b) = self.buckets.iter().position(|b| b.priority == priority) else {
            return false;
        };
        let bucket = &mut self.buckets[b];
        let Some(t) = bucket.tasks.iter().position(|&id| id == task) else {
            return false;
        };
        bucket.tasks.remove(t);
        if bucket.tasks.is_empty() {
            self.buckets.remove(b);
        }
        true
    }

    /// Move `task` to the tail of its bucket.
    pub fn requeue(&mut self, task: TaskId, priority: Priority) {
        if self.remove(task, priority) {
            self.insert(task, priority);
        }
    }

    /// Move `task` from the bucket for `from` to the tail of `to`.
    pub fn reprioritize(&mut self, task: TaskId, from: Priority, to: Priority) {
        if self.remove(task, from) {
            self.insert(task, to);
        }
    }

    /// All tasks, most urgent bucket first, FIFO within a bucket.
    pub fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.buckets.iter().flat_map(|b| b.tasks.iter().copied())
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.iter().any(|id| id == task)
    }

    /// Number of priority buckets currently alive.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        ReadyQueue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(ready: &ReadyQueue) -> Vec<usize, MAX_TASKS> {
        ready.iter().map(|t| t.0).collect()
    }

    #[test]
    fn test_buckets_ascending_fifo_within() {
        let mut ready = ReadyQueue::new();
        ready.insert(TaskId(0), 255);
        ready.insert(TaskId(1), 4);
        ready.insert(TaskId(2), 2);
        ready.insert(TaskId(3), 4);
        ready.insert(TaskId(4), 9);

        assert_eq!(ids(&ready).as_slice(), &[2, 1, 3, 4, 0]);
        assert_eq!(ready.bucket_count(), 4);
    }

    #[test]
    fn test_bucket_dropped_when_empty() {
        let mut ready = ReadyQueue::new();
        ready.insert(TaskId(0), 3);
        ready.insert(TaskId(1), 7);

        assert!(ready.remove(TaskId(0), 3));
        assert_eq!(ready.bucket_count(), 1);
        assert!(!ready.remove(TaskId(0), 3));
        // Wrong bucket
        assert!(!ready.remove(TaskId(1), 3));
        assert!(ready.remove(TaskId(1), 7));
        assert!(ready.is_empty());
    }

    #[test]
    fn test_requeue_rotates_peers() {
        let mut ready = ReadyQueue::new();
        ready.insert(TaskId(0), 5);
        ready.insert(TaskId(1), 5);
        ready.insert(TaskId(2), 5);

        ready.requeue(TaskId(0), 5);
        assert_eq!(ids(&ready).as_slice(), &[1, 2, 0]);
        ready.requeue(TaskId(1), 5);
        assert_eq!(ids(&ready).as_slice(), &[2, 0, 1]);
    }

    #[test]
    fn test_reprioritize_moves_between_buckets() {
        let mut ready = ReadyQueue::new();
        ready.insert(TaskId(0), 2);
        ready.insert(TaskId(1), 8);

        ready.reprioritize(TaskId(1), 8, 1);
        assert_eq!(ids(&ready).as_slice(), &[1, 0]);
        assert_eq!(ready.bucket_count(), 2);

        ready.reprioritize(TaskId(1), 1, 2);
        assert_eq!(ids(&ready).as_slice(), &[0, 1]);
        assert_eq!(ready.bucket_count(), 1);
        assert!(ready.contains(TaskId(1)));
    }
}
