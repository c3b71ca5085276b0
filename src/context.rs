//! Shared state handed to every collection task
//!
//! Built once by the coordinator and shared through an `Arc`; everything in
//! it is either immutable or a thread-safe channel handle.

use crate::artifact::{Artifact, Format};
use crate::exec::{CommandExecutor, CommandOutput, CommandSpec, Target};
use crate::filter::PathFilter;
use crate::output::WriterHandle;
use std::sync::Arc;
use tracing::{error, warn};

/// Knobs used by the command catalog
#[derive(Debug, Clone)]
pub struct CollectSettings {
    /// Ceph cluster config file
    pub ceph_conf: String,

    /// Ceph keyring file
    pub ceph_key: String,

    /// Lines taken from the tail of daemon logs
    pub ceph_log_max_lines: usize,

    /// Sampling duration for performance tools
    pub performance_collect_seconds: u64,

    /// Above this many PGs `pg dump` is skipped
    pub max_pg_dump_count: u64,
}

impl CollectSettings {
    /// Prefix for `ceph` CLI invocations (note trailing space)
    pub fn ceph_cmd(&self) -> String {
        format!("ceph -c {} -k {} --format json ", self.ceph_conf, self.ceph_key)
    }

    /// Prefix for `rados` CLI invocations (note trailing space)
    pub fn rados_cmd(&self) -> String {
        format!("rados -c {} -k {} --format json ", self.ceph_conf, self.ceph_key)
    }
}

impl Default for CollectSettings {
    fn default() -> Self {
        Self {
            ceph_conf: "/etc/ceph/ceph.conf".to_string(),
            ceph_key: "/etc/ceph/ceph.client.admin.keyring".to_string(),
            ceph_log_max_lines: 1000,
            performance_collect_seconds: 60,
            max_pg_dump_count: 1 << 15,
        }
    }
}

/// Everything a task needs to run commands and emit artifacts
pub struct CollectContext {
    executor: Arc<dyn CommandExecutor>,
    filter: Arc<PathFilter>,
    sink: WriterHandle,
    settings: CollectSettings,
}

impl CollectContext {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        filter: Arc<PathFilter>,
        sink: WriterHandle,
        settings: CollectSettings,
    ) -> Self {
        Self {
            executor,
            filter,
            sink,
            settings,
        }
    }

    pub fn settings(&self) -> &CollectSettings {
        &self.settings
    }

    /// Check a logical path against the exclusion filter
    pub fn allowed(&self, path: &str) -> bool {
        self.filter.allowed(path)
    }

    /// Run a command without emitting anything
    pub fn run(&self, target: &Target, command: &str) -> CommandOutput {
        self.executor
            .execute(&CommandSpec::on(target.clone(), command))
    }

    /// Send an artifact to the writer, unless the path is excluded
    pub fn emit(&self, path: &str, format: Format, ok: bool, payload: impl Into<Vec<u8>>) {
        if !self.allowed(path) {
            return;
        }

        if let Err(e) = self.sink.send(Artifact::new(path, format, ok, payload)) {
            error!(path = %path, error = %e, "Failed to send artifact to writer");
        }
    }

    /// Run a command and emit its output as one artifact
    ///
    /// Excluded paths are skipped before the command runs. Returns the
    /// command outcome, or `None` if nothing ran.
    pub fn collect(
        &self,
        target: &Target,
        path: &str,
        format: Format,
        command: &str,
    ) -> Option<bool> {
        if !self.allowed(path) {
            return None;
        }

        let out = self.run(target, command);
        if !out.success {
            warn!(command = %command, node = %target, "Command failed");
        }

        self.emit(path, format, out.success, out.output);
        Some(out.success)
    }
}
