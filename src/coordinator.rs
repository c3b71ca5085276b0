//! Run coordinator - orchestrates discovery and the collection phases
//!
//! The coordinator is responsible for:
//! - Starting the result writer and building the shared context
//! - Discovering the topology and adding the master pseudo-node
//! - Turning (collector, role, node, params) into tasks
//! - Running phase 1, the dwell wait and phase 2 on worker pools
//! - Shutting the writer down and reporting
//!
//! ```text
//! Discovering ─► Phase1Running ─► Phase1Done ─┬─► WaitingDwell ─► Phase2Running ─► Phase2Done ─┐
//!                                             └────────────────────────────────────────────────┴─► Finalizing ─► Done
//! ```
//!
//! Phase 2 only exists when a usage collector is enabled; it resamples the
//! usage counters no earlier than the configured interval after phase 1
//! started.

use crate::collectors::usage::sample_params;
use crate::collectors::{Collector, CollectorSet};
use crate::config::CollectConfig;
use crate::context::CollectContext;
use crate::error::{Result, WorkerError};
use crate::exec::CommandExecutor;
use crate::output::{ResultWriter, WriterSummary};
use crate::pool::{PoolProgress, Task, WorkerPool};
use crate::topology::{Discovery, Topology};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// States of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Discovering,
    Phase1Running,
    Phase1Done,
    WaitingDwell,
    Phase2Running,
    Phase2Done,
    Finalizing,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Discovering => "discovering",
            RunPhase::Phase1Running => "phase 1",
            RunPhase::Phase1Done => "phase 1 done",
            RunPhase::WaitingDwell => "waiting",
            RunPhase::Phase2Running => "phase 2",
            RunPhase::Phase2Done => "phase 2 done",
            RunPhase::Finalizing => "finalizing",
            RunPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Callback invoked while a phase drains
pub type ProgressHook = Box<dyn Fn(RunPhase, PoolProgress) + Send + Sync>;

/// Outcome of one phase
#[derive(Debug, Clone)]
pub struct PhaseReport {
    /// `Phase1Running` or `Phase2Running`
    pub phase: RunPhase,

    /// Tasks executed
    pub tasks: u64,

    /// Tasks stopped by an error
    pub failed: u64,

    /// Tasks that panicked
    pub panicked: u64,

    /// When the phase started
    pub started: Instant,

    /// Time from start until the pool drained
    pub duration: Duration,
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Root of the output tree
    pub root: PathBuf,

    /// Distinct hosts in the topology
    pub hosts: usize,

    /// Enabled collector names
    pub collectors: Vec<&'static str>,

    /// Phase 1, then phase 2 if it ran
    pub phases: Vec<PhaseReport>,

    /// Final writer counters
    pub writer: WriterSummary,

    /// Total run time
    pub duration: Duration,
}

impl RunReport {
    pub fn phase1(&self) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == RunPhase::Phase1Running)
    }

    pub fn phase2(&self) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == RunPhase::Phase2Running)
    }

    /// Delay between the starts of phase 1 and phase 2
    pub fn phase2_delay(&self) -> Option<Duration> {
        let first = self.phase1()?;
        let second = self.phase2()?;
        Some(second.started.saturating_duration_since(first.started))
    }

    pub fn total_tasks(&self) -> u64 {
        self.phases.iter().map(|p| p.tasks).sum()
    }

    /// Tasks that errored or panicked
    pub fn total_failed(&self) -> u64 {
        self.phases.iter().map(|p| p.failed + p.panicked).sum()
    }
}

/// Coordinates a full collection run
pub struct RunCoordinator {
    /// Configuration
    config: CollectConfig,

    /// Root of the output tree
    root: PathBuf,

    /// Runs every command
    executor: Arc<dyn CommandExecutor>,

    /// Optional progress callback
    progress: Option<ProgressHook>,
}

impl RunCoordinator {
    pub fn new(config: CollectConfig, root: &Path, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            config,
            root: root.to_path_buf(),
            executor,
            progress: None,
        }
    }

    /// Report pool progress while phases drain
    pub fn with_progress(mut self, hook: ProgressHook) -> Self {
        self.progress = Some(hook);
        self
    }

    /// Run discovery and all collection phases
    ///
    /// Discovery failure is fatal and nothing is collected. Once tasks are
    /// running, failures are contained and the run always finalizes.
    pub fn run(self, discovery: &dyn Discovery) -> Result<RunReport> {
        let start_time = Instant::now();

        info!(
            root = %self.root.display(),
            workers = self.config.pool_size,
            collectors = %self.config.collectors.names().join(","),
            "Starting collection"
        );

        let writer = ResultWriter::new(&self.root, self.config.writer)?;

        self.enter(RunPhase::Discovering);
        let mut topology = match discovery.discover() {
            Ok(topology) => topology,
            Err(e) => {
                if let Err(werr) = writer.finish() {
                    warn!(error = %werr, "Writer shutdown failed");
                }
                return Err(e.into());
            }
        };
        topology.add_master();
        topology.log_summary();

        let ctx = Arc::new(CollectContext::new(
            Arc::clone(&self.executor),
            Arc::new(self.config.filter.clone()),
            writer.handle(),
            self.config.settings.clone(),
        ));

        let phases = self.run_phases(&ctx, &topology);

        self.enter(RunPhase::Finalizing);
        drop(ctx);
        let summary = writer.finish()?;
        let phases = phases?;

        self.enter(RunPhase::Done);
        let report = RunReport {
            root: self.root.clone(),
            hosts: topology.host_count(),
            collectors: self.config.collectors.names(),
            phases,
            writer: summary,
            duration: start_time.elapsed(),
        };

        info!(
            tasks = report.total_tasks(),
            failed = report.total_failed(),
            artifacts = report.writer.artifacts_written,
            duration_secs = report.duration.as_secs_f64(),
            "Collection complete"
        );

        Ok(report)
    }

    fn run_phases(
        &self,
        ctx: &Arc<CollectContext>,
        topology: &Topology,
    ) -> std::result::Result<Vec<PhaseReport>, WorkerError> {
        let mut phases = Vec::with_capacity(2);

        let tasks = phase1_tasks(&self.config.collectors, topology);
        let first = self.run_phase(RunPhase::Phase1Running, ctx, tasks)?;
        let phase1_started = first.started;
        phases.push(first);
        self.enter(RunPhase::Phase1Done);

        if let Some(usage) = self.config.collectors.usage() {
            self.enter(RunPhase::WaitingDwell);
            let dwell = self
                .config
                .usage_interval
                .saturating_sub(phase1_started.elapsed());
            if !dwell.is_zero() {
                info!(seconds = dwell.as_secs_f64(), "Waiting before second usage sample");
                thread::sleep(dwell);
            }

            let tasks = usage_tasks(usage, topology, 1);
            phases.push(self.run_phase(RunPhase::Phase2Running, ctx, tasks)?);
            self.enter(RunPhase::Phase2Done);
        }

        Ok(phases)
    }

    /// Run one batch of tasks on a fresh pool and wait for all of them
    ///
    /// The configured pool size is an upper bound: a phase with fewer
    /// tasks starts one worker per task.
    fn run_phase(
        &self,
        phase: RunPhase,
        ctx: &Arc<CollectContext>,
        tasks: Vec<Task>,
    ) -> std::result::Result<PhaseReport, WorkerError> {
        self.enter(phase);
        let started = Instant::now();
        let count = tasks.len();

        let size = self.config.pool_size.min(count).max(1);
        let pool = WorkerPool::start(size, Arc::clone(ctx))?;

        info!(phase = %phase, tasks = count, workers = size, "Phase started");
        for task in tasks {
            pool.submit(task)?;
        }

        pool.drain_with(|progress| {
            if let Some(hook) = &self.progress {
                hook(phase, progress);
            }
        });
        let stats = pool.shutdown()?;

        let report = PhaseReport {
            phase,
            tasks: stats.tasks_run,
            failed: stats.tasks_failed,
            panicked: stats.tasks_panicked,
            started,
            duration: started.elapsed(),
        };

        info!(
            phase = %phase,
            tasks = report.tasks,
            failed = report.failed,
            panicked = report.panicked,
            duration_secs = report.duration.as_secs_f64(),
            "Phase finished"
        );

        Ok(report)
    }

    fn enter(&self, phase: RunPhase) {
        debug!(state = %phase, "Run state");
    }
}

/// Every bulk collector x role with a handler x node x params, plus the
/// first usage sample of each host
pub fn phase1_tasks(collectors: &CollectorSet, topology: &Topology) -> Vec<Task> {
    let mut tasks = Vec::new();

    for collector in collectors.bulk() {
        for role in topology.roles() {
            let handler = match collector.handler(role) {
                Some(handler) => handler,
                None => continue,
            };

            for (node, records) in topology.nodes(role) {
                for params in records {
                    tasks.push(Task::for_handler(
                        collector.name(),
                        role,
                        handler,
                        node,
                        params.clone(),
                    ));
                }
            }
        }
    }

    if let Some(usage) = collectors.usage() {
        tasks.extend(usage_tasks(usage, topology, 0));
    }

    tasks
}

/// One task per node of each role the usage collector handles
pub fn usage_tasks(usage: &Collector, topology: &Topology, sample: i64) -> Vec<Task> {
    let mut tasks = Vec::new();

    for role in usage.roles() {
        let handler = match usage.handler(role) {
            Some(handler) => handler,
            None => continue,
        };

        for (node, _) in topology.nodes(role) {
            tasks.push(Task::for_handler(
                usage.name(),
                role,
                handler,
                node,
                sample_params(sample),
            ));
        }
    }

    tasks
}
