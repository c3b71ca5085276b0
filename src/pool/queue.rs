//! Task queue
//!
//! An unbounded FIFO of collection tasks shared by all workers, plus a
//! pending-task counter the pool uses to know when a phase is drained.
//! Closing the queue (dropping its only sender) is what tells workers to
//! exit once the remaining tasks are consumed.

use crate::collectors::Handler;
use crate::context::CollectContext;
use crate::error::{TaskResult, WorkerError};
use crate::topology::{Params, Role};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Deferred body of a task
pub type Job = Box<dyn FnOnce(&CollectContext) -> TaskResult<()> + Send + 'static>;

/// One unit of collection work, consumed exactly once
pub struct Task {
    /// Human-readable label used in logs
    label: String,

    job: Job,
}

impl Task {
    pub fn new<F>(label: impl Into<String>, job: F) -> Self
    where
        F: FnOnce(&CollectContext) -> TaskResult<()> + Send + 'static,
    {
        Self {
            label: label.into(),
            job: Box::new(job),
        }
    }

    /// Bind a collector handler to one (node, params) entry of a role
    pub fn for_handler(
        collector: &str,
        role: Role,
        handler: Handler,
        node: &str,
        params: Params,
    ) -> Self {
        let node = node.to_string();
        let label = format!("{}:{}:{}", collector, role, node);
        Self::new(label, move |ctx| handler(ctx, &node, &params))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Execute the task body
    pub fn run(self, ctx: &CollectContext) -> TaskResult<()> {
        (self.job)(ctx)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("label", &self.label).finish()
    }
}

/// Statistics for the task queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total tasks enqueued
    pub enqueued: AtomicU64,

    /// Total tasks finished (whatever the outcome)
    pub completed: AtomicU64,
}

impl QueueStats {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

/// Count of submitted tasks that have not finished yet
#[derive(Debug, Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn increment(&self) {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn decrement(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn get(&self) -> usize {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait up to `timeout` for the count to reach zero
    fn wait_idle(&self, timeout: Duration) -> bool {
        let count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        let (count, _) = self
            .idle
            .wait_timeout_while(count, timeout, |count| *count > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *count == 0
    }
}

/// Shared FIFO of tasks
pub struct TaskQueue {
    /// Only sender; dropped by `close`
    sender: Option<Sender<Task>>,

    receiver: Receiver<Task>,

    pending: Arc<Pending>,

    stats: Arc<QueueStats>,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();

        Self {
            sender: Some(sender),
            receiver,
            pending: Arc::new(Pending::default()),
            stats: Arc::new(QueueStats::default()),
        }
    }

    /// Enqueue a task (never blocks)
    pub fn submit(&self, task: Task) -> Result<(), WorkerError> {
        let sender = self.sender.as_ref().ok_or(WorkerError::QueueSendFailed)?;

        self.pending.increment();
        if sender.send(task).is_err() {
            self.pending.decrement();
            return Err(WorkerError::QueueSendFailed);
        }

        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Get a receiver for this queue (clone for each worker)
    pub fn receiver(&self) -> TaskQueueReceiver {
        TaskQueueReceiver {
            receiver: self.receiver.clone(),
            pending: Arc::clone(&self.pending),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Stop accepting tasks; workers exit once the queue is empty
    pub fn close(&mut self) {
        self.sender = None;
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_none()
    }

    /// Block up to `timeout` for all submitted tasks to finish
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.pending.wait_idle(timeout)
    }

    /// All submitted tasks have finished
    pub fn is_complete(&self) -> bool {
        self.pending.get() == 0
    }

    /// Submitted tasks not finished yet (queued or running)
    pub fn pending(&self) -> usize {
        self.pending.get()
    }

    /// Tasks waiting in the queue
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for receiving tasks from the queue
#[derive(Clone)]
pub struct TaskQueueReceiver {
    receiver: Receiver<Task>,
    pending: Arc<Pending>,
    stats: Arc<QueueStats>,
}

impl TaskQueueReceiver {
    /// Block until a task is available; `None` once the queue is closed
    /// and empty
    pub fn recv(&self) -> Option<Task> {
        self.receiver.recv().ok()
    }

    fn finish_task(&self) {
        self.stats.completed.fetch_add(1, Ordering::Relaxed);
        self.pending.decrement();
    }
}

/// RAII guard marking a dequeued task as finished on drop
pub struct TaskGuard<'a> {
    receiver: &'a TaskQueueReceiver,
}

impl<'a> TaskGuard<'a> {
    pub fn new(receiver: &'a TaskQueueReceiver) -> Self {
        Self { receiver }
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        self.receiver.finish_task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(label: &str) -> Task {
        Task::new(label, |_| Ok(()))
    }

    #[test]
    fn test_queue_fifo() {
        let queue = TaskQueue::new();
        let receiver = queue.receiver();

        queue.submit(noop("a")).unwrap();
        queue.submit(noop("b")).unwrap();
        assert_eq!(queue.len(), 2);

        assert_eq!(receiver.recv().unwrap().label(), "a");
        assert_eq!(receiver.recv().unwrap().label(), "b");
    }

    #[test]
    fn test_queue_completion() {
        let queue = TaskQueue::new();
        let receiver = queue.receiver();

        // Nothing submitted = complete
        assert!(queue.is_complete());

        queue.submit(noop("a")).unwrap();
        assert!(!queue.is_complete());

        let _task = receiver.recv().unwrap();
        let guard = TaskGuard::new(&receiver);

        // Queue empty but task still running
        assert!(queue.is_empty());
        assert!(!queue.is_complete());
        assert!(!queue.wait_idle(Duration::from_millis(10)));

        drop(guard);
        assert!(queue.is_complete());
        assert!(queue.wait_idle(Duration::from_millis(10)));
        assert_eq!(queue.stats().completed(), 1);
    }

    #[test]
    fn test_close_disconnects_receivers() {
        let mut queue = TaskQueue::new();
        let receiver = queue.receiver();

        queue.submit(noop("last")).unwrap();
        queue.close();

        assert!(queue.is_closed());
        assert!(queue.submit(noop("late")).is_err());
        assert_eq!(queue.pending(), 1);

        // Remaining task is still delivered, then the queue reports closed
        assert_eq!(receiver.recv().unwrap().label(), "last");
        assert!(receiver.recv().is_none());
    }

    #[test]
    fn test_task_label() {
        fn handler(_: &CollectContext, _: &str, _: &Params) -> TaskResult<()> {
            Ok(())
        }

        let task = Task::for_handler("ceph", Role::Osd, handler, "h1", Params::new());
        assert_eq!(task.label(), "ceph:osd:h1");
        assert_eq!(format!("{:?}", task), "Task { label: \"ceph:osd:h1\" }");
    }
}
