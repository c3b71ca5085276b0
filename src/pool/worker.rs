//! Worker thread logic for the collection pool
//!
//! Each worker:
//! - Pulls tasks from the shared queue until it is closed and empty
//! - Runs each task against the shared collection context
//! - Contains task failures and panics so the thread keeps serving

use crate::context::CollectContext;
use crate::error::{TaskOutcome, WorkerError};
use crate::pool::queue::{Task, TaskGuard, TaskQueueReceiver};
use crate::pool::PoolStats;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace, warn};

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Tasks run to completion
    pub tasks_run: AtomicU64,

    /// Tasks that returned an error
    pub tasks_failed: AtomicU64,

    /// Tasks that panicked
    pub tasks_panicked: AtomicU64,
}

impl WorkerStats {
    fn record(&self, outcome: &TaskOutcome) {
        self.tasks_run.fetch_add(1, Ordering::Relaxed);
        match outcome {
            TaskOutcome::Completed { .. } => {}
            TaskOutcome::Failed { .. } => {
                self.tasks_failed.fetch_add(1, Ordering::Relaxed);
            }
            TaskOutcome::Panicked { .. } => {
                self.tasks_panicked.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// A worker thread that runs collection tasks
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Thread handle
    handle: Option<JoinHandle<()>>,

    /// Worker statistics
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn(
        id: usize,
        ctx: Arc<CollectContext>,
        queue_rx: TaskQueueReceiver,
    ) -> Result<Self, WorkerError> {
        let stats = Arc::new(WorkerStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("collector-{}", id))
            .spawn(move || worker_loop(id, ctx, queue_rx, stats_clone))
            .map_err(|e| WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Statistics handle that outlives the worker
    pub fn shared_stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|payload| WorkerError::Panicked {
                id: self.id,
                message: panic_message(payload.as_ref()),
            }),
            None => Ok(()),
        }
    }
}

/// Main worker loop
fn worker_loop(
    id: usize,
    ctx: Arc<CollectContext>,
    queue_rx: TaskQueueReceiver,
    stats: Arc<WorkerStats>,
) {
    debug!(worker = id, "Worker starting");

    while let Some(task) = queue_rx.recv() {
        let _guard = TaskGuard::new(&queue_rx);

        let outcome = run_isolated(task, &ctx);
        stats.record(&outcome);

        match &outcome {
            TaskOutcome::Completed { label } => {
                trace!(worker = id, task = %label, "Task completed");
            }
            TaskOutcome::Failed { label, error } => {
                warn!(worker = id, task = %label, error = %error, "Task failed");
            }
            TaskOutcome::Panicked { label, message } => {
                error!(worker = id, task = %label, message = %message, "Task panicked");
            }
        }
    }

    debug!(
        worker = id,
        tasks = stats.tasks_run.load(Ordering::Relaxed),
        "Worker stopping"
    );
}

/// Run one task, turning both errors and panics into an outcome
pub fn run_isolated(task: Task, ctx: &CollectContext) -> TaskOutcome {
    let label = task.label().to_string();

    match panic::catch_unwind(AssertUnwindSafe(|| task.run(ctx))) {
        Ok(Ok(())) => TaskOutcome::Completed { label },
        Ok(Err(error)) => TaskOutcome::Failed { label, error },
        Err(payload) => TaskOutcome::Panicked {
            label,
            message: panic_message(payload.as_ref()),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Aggregate stats from all workers
pub fn aggregate_stats<'a, I>(workers: I) -> PoolStats
where
    I: IntoIterator<Item = &'a WorkerStats>,
{
    let mut total = PoolStats::default();

    for stats in workers {
        total.tasks_run += stats.tasks_run.load(Ordering::Relaxed);
        total.tasks_failed += stats.tasks_failed.load(Ordering::Relaxed);
        total.tasks_panicked += stats.tasks_panicked.load(Ordering::Relaxed);
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CollectSettings;
    use crate::error::TaskError;
    use crate::exec::{CommandExecutor, CommandOutput, CommandSpec};
    use crate::filter::PathFilter;
    use crate::output::{ResultWriter, WriterOptions};
    use tempfile::tempdir;

    struct NullExecutor;

    impl CommandExecutor for NullExecutor {
        fn execute(&self, _spec: &CommandSpec) -> CommandOutput {
            CommandOutput::ok("")
        }
    }

    #[test]
    fn test_run_isolated_outcomes() {
        let dir = tempdir().unwrap();
        let writer = ResultWriter::new(dir.path(), WriterOptions::default()).unwrap();
        let ctx = CollectContext::new(
            Arc::new(NullExecutor),
            Arc::new(PathFilter::allow_all()),
            writer.handle(),
            CollectSettings::default(),
        );

        let ok = run_isolated(Task::new("ok", |_| Ok(())), &ctx);
        assert!(ok.is_success());

        let failed = run_isolated(
            Task::new("failed", |_| {
                Err(TaskError::MissingParam {
                    node: "h1".into(),
                    name: "osd_id".into(),
                })
            }),
            &ctx,
        );
        assert!(matches!(failed, TaskOutcome::Failed { .. }));

        let panicked = run_isolated(Task::new("boom", |_| panic!("kaboom")), &ctx);
        match panicked {
            TaskOutcome::Panicked { label, message } => {
                assert_eq!(label, "boom");
                assert_eq!(message, "kaboom");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        writer.finish().unwrap();
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");

        let boxed: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
