//! Deferred task queue.
//!
//! Replaces zero-delay timers used purely for event ordering. A task deferred
//! while events are being handled runs at the end of the turn, after every
//! event that handling produced has been published. Tasks run in FIFO
//! order; tasks deferred while a batch is running wait for the next turn.

use std::collections::VecDeque;

/// Handle identifying one deferred task, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

#[derive(Debug)]
pub struct TaskQueue<T> {
    next_id: u64,
    tasks: VecDeque<(TaskHandle, T)>,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            tasks: VecDeque::new(),
        }
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defer(&mut self, task: T) -> TaskHandle {
        let handle = TaskHandle(self.next_id);
        self.next_id += 1;
        self.tasks.push_back((handle, task));
        handle
    }

    /// Returns `false` when the task already ran or was cancelled.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|(h, _)| *h != handle);
        self.tasks.len() != before
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    /// Take the current batch in FIFO order.
    pub fn take_batch(&mut self) -> Vec<(TaskHandle, T)> {
        self.tasks.drain(..).collect()
    }

    pub fn contains(&self, handle: TaskHandle) -> bool {
        self.tasks.iter().any(|(h, _)| *h == handle)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_run_in_fifo_order() {
        let mut queue = TaskQueue::new();
        queue.defer("first");
        queue.defer("second");

        let batch: Vec<_> = queue.take_batch().into_iter().map(|(_, t)| t).collect();
        assert_eq!(batch, vec!["first", "second"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn cancelled_tasks_never_run() {
        let mut queue = TaskQueue::new();
        let stale = queue.defer(1);
        queue.defer(2);

        assert!(queue.cancel(stale));
        assert!(!queue.cancel(stale));
        assert!(!queue.contains(stale));

        let batch: Vec<_> = queue.take_batch().into_iter().map(|(_, t)| t).collect();
        assert_eq!(batch, vec![2]);
    }

    #[test]
    fn tasks_deferred_after_take_wait_for_next_batch() {
        let mut queue = TaskQueue::new();
        queue.defer("a");
        let batch = queue.take_batch();
        queue.defer("b");

        assert_eq!(batch.len(), 1);
        assert_eq!(queue.len(), 1);
    }
}
