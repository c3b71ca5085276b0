//! Bounded worker pool
//!
//! A fixed number of named threads consume tasks from one shared queue.
//! Each submitted task is executed exactly once; a task that errors or
//! panics is logged and counted without taking its worker down.
//!
//! ```text
//! submit ──► TaskQueue (unbounded FIFO) ──► collector-0 ┐
//!                                       ├─► collector-1 ├─► WriterHandle
//!                                       └─► collector-N ┘
//! ```
//!
//! `drain` blocks until everything submitted so far has finished, so the
//! same pool serves several phases. `shutdown` closes the queue, which
//! makes every worker's `recv` fail once the queue is empty, and joins
//! the threads.

pub mod queue;
pub mod worker;

pub use queue::{QueueStats, Task, TaskGuard, TaskQueue, TaskQueueReceiver};
pub use worker::{run_isolated, Worker, WorkerStats};

use crate::context::CollectContext;
use crate::error::WorkerError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Hard upper bound on pool size
pub const MAX_POOL_SIZE: usize = 1024;

/// Default number of worker threads
pub const DEFAULT_POOL_SIZE: usize = 64;

/// How often `drain_with` reports progress
const DRAIN_POLL: Duration = Duration::from_millis(100);

/// Task counters summed over all workers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub tasks_run: u64,
    pub tasks_failed: u64,
    pub tasks_panicked: u64,
}

impl PoolStats {
    /// Counters accumulated since `earlier`
    pub fn since(&self, earlier: &PoolStats) -> PoolStats {
        PoolStats {
            tasks_run: self.tasks_run.saturating_sub(earlier.tasks_run),
            tasks_failed: self.tasks_failed.saturating_sub(earlier.tasks_failed),
            tasks_panicked: self.tasks_panicked.saturating_sub(earlier.tasks_panicked),
        }
    }
}

/// Snapshot handed to the `drain_with` callback
#[derive(Debug, Clone, Copy)]
pub struct PoolProgress {
    /// Tasks submitted over the pool's lifetime
    pub submitted: u64,

    /// Tasks finished over the pool's lifetime
    pub completed: u64,

    /// Tasks queued or running
    pub pending: usize,

    pub workers: usize,
}

/// Fixed-size pool of collection workers
pub struct WorkerPool {
    queue: TaskQueue,
    workers: Vec<Worker>,
}

impl WorkerPool {
    /// Spawn `size` workers sharing `ctx`
    pub fn start(size: usize, ctx: Arc<CollectContext>) -> Result<Self, WorkerError> {
        let mut queue = TaskQueue::new();
        let mut workers = Vec::with_capacity(size);

        for id in 0..size {
            match Worker::spawn(id, Arc::clone(&ctx), queue.receiver()) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    // Release already started workers before bailing out
                    queue.close();
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(e);
                }
            }
        }

        debug!(workers = size, "Worker pool started");
        Ok(Self { queue, workers })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Enqueue a task; returns immediately
    pub fn submit(&self, task: Task) -> Result<(), WorkerError> {
        self.queue.submit(task)
    }

    /// Block until every task submitted so far has finished
    pub fn drain(&self) {
        self.drain_with(|_| {});
    }

    /// Like `drain`, calling `on_tick` periodically while waiting
    pub fn drain_with<F: FnMut(PoolProgress)>(&self, mut on_tick: F) {
        loop {
            let idle = self.queue.wait_idle(DRAIN_POLL);
            on_tick(self.progress());
            if idle {
                break;
            }
        }
    }

    pub fn progress(&self) -> PoolProgress {
        let stats = self.queue.stats();
        PoolProgress {
            submitted: stats.enqueued(),
            completed: stats.completed(),
            pending: self.queue.pending(),
            workers: self.workers.len(),
        }
    }

    /// Current task counters
    pub fn stats(&self) -> PoolStats {
        worker::aggregate_stats(self.workers.iter().map(Worker::stats))
    }

    /// Stop accepting tasks, let workers finish the queue, join them
    pub fn shutdown(mut self) -> Result<PoolStats, WorkerError> {
        self.queue.close();
        let shared: Vec<Arc<WorkerStats>> =
            self.workers.iter().map(Worker::shared_stats).collect();

        let mut first_error = None;
        for worker in self.workers.drain(..) {
            let id = worker.id();
            if let Err(e) = worker.join() {
                warn!(worker = id, error = %e, "Worker did not exit cleanly");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(worker::aggregate_stats(shared.iter().map(Arc::as_ref))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CollectSettings;
    use crate::error::TaskError;
    use crate::exec::{CommandExecutor, CommandOutput, CommandSpec};
    use crate::filter::PathFilter;
    use crate::output::{ResultWriter, WriterOptions};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct NullExecutor;

    impl CommandExecutor for NullExecutor {
        fn execute(&self, _spec: &CommandSpec) -> CommandOutput {
            CommandOutput::ok("")
        }
    }

    fn with_context<T>(f: impl FnOnce(Arc<CollectContext>) -> T) -> T {
        let dir = tempdir().unwrap();
        let writer = ResultWriter::new(dir.path(), WriterOptions::default()).unwrap();
        let ctx = Arc::new(CollectContext::new(
            Arc::new(NullExecutor),
            Arc::new(PathFilter::allow_all()),
            writer.handle(),
            CollectSettings::default(),
        ));
        let result = f(ctx);
        writer.finish().unwrap();
        result
    }

    #[test]
    fn test_each_task_runs_once() {
        with_context(|ctx| {
            let pool = WorkerPool::start(4, ctx).unwrap();
            let seen = Arc::new(Mutex::new(Vec::new()));

            for i in 0..100 {
                let seen = Arc::clone(&seen);
                pool.submit(Task::new(format!("t{}", i), move |_| {
                    seen.lock().unwrap().push(i);
                    Ok(())
                }))
                .unwrap();
            }

            pool.drain();
            let seen = seen.lock().unwrap().clone();
            assert_eq!(seen.len(), 100);
            assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 100);

            let stats = pool.shutdown().unwrap();
            assert_eq!(stats.tasks_run, 100);
        });
    }

    #[test]
    fn test_failures_do_not_stop_workers() {
        with_context(|ctx| {
            let pool = WorkerPool::start(1, ctx).unwrap();
            let done = Arc::new(AtomicUsize::new(0));

            pool.submit(Task::new("panics", |_| panic!("broken collector")))
                .unwrap();
            pool.submit(Task::new("errors", |_| {
                Err(TaskError::MissingParam {
                    node: "h1".into(),
                    name: "osd_id".into(),
                })
            }))
            .unwrap();
            for _ in 0..3 {
                let done = Arc::clone(&done);
                pool.submit(Task::new("fine", move |_| {
                    done.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
                .unwrap();
            }

            pool.drain();
            assert_eq!(done.load(Ordering::SeqCst), 3);

            let stats = pool.shutdown().unwrap();
            assert_eq!(
                stats,
                PoolStats {
                    tasks_run: 5,
                    tasks_failed: 1,
                    tasks_panicked: 1,
                }
            );
        });
    }

    #[test]
    fn test_drain_reusable_across_phases() {
        with_context(|ctx| {
            let pool = WorkerPool::start(2, ctx).unwrap();

            pool.submit(Task::new("phase1", |_| Ok(()))).unwrap();
            pool.drain();
            let phase1 = pool.stats();
            assert_eq!(phase1.tasks_run, 1);

            pool.submit(Task::new("phase2-a", |_| Ok(()))).unwrap();
            pool.submit(Task::new("phase2-b", |_| Ok(()))).unwrap();
            let mut ticks = 0;
            pool.drain_with(|progress| {
                ticks += 1;
                assert_eq!(progress.workers, 2);
            });
            assert!(ticks >= 1);
            assert_eq!(pool.stats().since(&phase1).tasks_run, 2);
            assert_eq!(pool.progress().pending, 0);

            pool.shutdown().unwrap();
        });
    }

    #[test]
    fn test_empty_pool_drains_and_shuts_down() {
        with_context(|ctx| {
            let pool = WorkerPool::start(3, ctx).unwrap();
            pool.drain();
            assert_eq!(pool.shutdown().unwrap(), PoolStats::default());
        });
    }
}
