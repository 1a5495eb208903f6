//! Ordered task queue consumed by an Orch.

use std::collections::VecDeque;
use std::fmt::Debug;

/// Configuration for a TaskQueue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue name used in logs and dumps (e.g. "ROUTING_TASKS").
    pub name: String,
    /// Maximum number of tasks returned by one [`TaskQueue::drain`].
    pub batch_size: usize,
}

impl QueueConfig {
    /// Creates a new queue config.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            batch_size: 128,
        }
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// FIFO queue of pending tasks for one Orch.
///
/// Tasks are processed in arrival order. A task that supersedes earlier
/// pending work (for example a full resync after several topology changes)
/// can be enqueued with [`TaskQueue::push_coalescing`], which drops every
/// pending task it makes redundant.
#[derive(Debug)]
pub struct TaskQueue<T> {
    config: QueueConfig,
    pending: VecDeque<T>,
    coalesced: u64,
}

impl<T: Debug> TaskQueue<T> {
    /// Creates a new queue with the given configuration.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            pending: VecDeque::new(),
            coalesced: 0,
        }
    }

    /// Returns the queue name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns true if there are pending tasks.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Returns the number of pending tasks.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns how many tasks were dropped by coalescing so far.
    pub fn coalesced_count(&self) -> u64 {
        self.coalesced
    }

    /// Appends a task.
    pub fn push(&mut self, task: T) {
        self.pending.push_back(task);
    }

    /// Appends several tasks, preserving their order.
    pub fn extend(&mut self, tasks: impl IntoIterator<Item = T>) {
        self.pending.extend(tasks);
    }

    /// Appends `task` after removing every pending task for which
    /// `superseded` returns true.
    pub fn push_coalescing<F>(&mut self, task: T, superseded: F)
    where
        F: Fn(&T) -> bool,
    {
        let before = self.pending.len();
        self.pending.retain(|t| !superseded(t));
        let dropped = before - self.pending.len();
        if dropped > 0 {
            log::debug!("{}: coalesced {} pending tasks", self.config.name, dropped);
            self.coalesced += dropped as u64;
        }
        self.pending.push_back(task);
    }

    /// Removes and returns up to `batch_size` tasks in arrival order.
    pub fn drain(&mut self) -> Vec<T> {
        let count = self.pending.len().min(self.config.batch_size);
        self.pending.drain(..count).collect()
    }

    /// Removes and returns every pending task.
    pub fn drain_all(&mut self) -> Vec<T> {
        self.pending.drain(..).collect()
    }

    /// Peeks at pending tasks without removing them.
    pub fn peek(&self) -> impl Iterator<Item = &T> {
        self.pending.iter()
    }

    /// Clears all pending tasks.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Dumps pending tasks for debugging.
    pub fn dump(&self) -> Vec<String> {
        self.pending
            .iter()
            .map(|t| format!("{}: {:?}", self.config.name, t))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq)]
    enum Task {
        Add(u32),
        Resync,
    }

    #[test]
    fn test_queue_fifo() {
        let mut queue = TaskQueue::new(QueueConfig::new("TEST"));
        assert_eq!(queue.name(), "TEST");
        assert!(!queue.has_pending());

        queue.push(Task::Add(1));
        queue.extend([Task::Add(2), Task::Add(3)]);
        assert_eq!(queue.pending_count(), 3);

        assert_eq!(
            queue.drain(),
            vec![Task::Add(1), Task::Add(2), Task::Add(3)]
        );
        assert!(!queue.has_pending());
    }

    #[test]
    fn test_queue_batch_size() {
        let mut queue = TaskQueue::new(QueueConfig::new("TEST").with_batch_size(2));
        queue.extend([Task::Add(1), Task::Add(2), Task::Add(3)]);

        assert_eq!(queue.drain(), vec![Task::Add(1), Task::Add(2)]);
        assert_eq!(queue.drain(), vec![Task::Add(3)]);
    }

    #[test]
    fn test_queue_coalescing() {
        let mut queue = TaskQueue::new(QueueConfig::new("TEST"));
        queue.push(Task::Resync);
        queue.push(Task::Add(7));
        queue.push_coalescing(Task::Resync, |t| *t == Task::Resync);

        // The earlier resync is dropped; the add stays ahead of the new one
        assert_eq!(queue.drain_all(), vec![Task::Add(7), Task::Resync]);
        assert_eq!(queue.coalesced_count(), 1);
    }

    #[test]
    fn test_queue_dump() {
        let mut queue = TaskQueue::new(QueueConfig::new("TEST"));
        queue.push(Task::Add(4));
        assert_eq!(queue.dump(), vec!["TEST: Add(4)".to_string()]);

        queue.clear();
        assert!(queue.dump().is_empty());
    }
}
