//! Error types for ceph-collect
//!
//! This module defines the error hierarchy of a collection run:
//! - Discovery errors (fatal, abort the run before any task executes)
//! - Task errors (abort a single collection task, contained by the pool)
//! - Writer errors (a single artifact is lost, the run continues)
//! - Configuration and worker thread errors
//!
//! A failed command is not an error type at all: it becomes an `err`
//! artifact in the output tree.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for a collection run
#[derive(Error, Debug)]
pub enum CollectError {
    /// Topology could not be obtained
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Result writer errors
    #[error("Writer error: {0}")]
    Writer(#[from] WriterError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors (output folder, archive, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while building the cluster topology
#[derive(Error, Debug, Clone)]
pub enum DiscoveryError {
    /// Control-plane query returned a failure status
    #[error("Control-plane query '{command}' failed: {output}")]
    QueryFailed { command: String, output: String },

    /// Control-plane reply could not be decoded
    #[error("Cannot parse reply of '{command}': {reason}")]
    InvalidReply { command: String, reason: String },
}

/// A collection task could not continue past a required step
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// A command whose output feeds a later step failed
    #[error("Required command '{command}' failed on {target}: {output}")]
    RequiredCommand {
        target: String,
        command: String,
        output: String,
    },

    /// Output of a required command did not have the expected shape
    #[error("Unexpected output of '{command}' on {target}: {reason}")]
    UnexpectedOutput {
        target: String,
        command: String,
        reason: String,
    },

    /// A parameter the handler depends on is missing from the topology
    #[error("Missing parameter '{name}' for node {node}")]
    MissingParam { node: String, name: String },
}

/// Result writer errors
#[derive(Error, Debug)]
pub enum WriterError {
    /// Logical path normalized to nothing
    #[error("Artifact path '{path}' is empty after normalization")]
    EmptyPath { path: String },

    /// Logical path tries to leave the output root
    #[error("Artifact path '{path}' escapes the output folder")]
    UnsafePath { path: String },

    /// Destination was already written during this run
    #[error("Refusing to overwrite '{path}'")]
    AlreadyWritten { path: PathBuf },

    /// Failed to create or write the destination file
    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Writer channel closed unexpectedly
    #[error("Result writer channel closed unexpectedly")]
    ChannelClosed,

    /// Writer thread could not be started or panicked
    #[error("Result writer thread failed: {0}")]
    Thread(String),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid pool size
    #[error("Invalid pool size {count}: must be between 1 and {max}")]
    InvalidPoolSize { count: usize, max: usize },

    /// Invalid exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    /// Collector name not in the catalog
    #[error("Unknown collector '{name}', select from: {known}")]
    UnknownCollector { name: String, known: String },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked outside of task isolation
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Task queue send failed
    #[error("Failed to submit task: queue closed")]
    QueueSendFailed,

    /// Worker initialization failed
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },
}

/// Result type alias for CollectError
pub type Result<T> = std::result::Result<T, CollectError>;

/// Result type alias for TaskError
pub type TaskResult<T> = std::result::Result<T, TaskError>;

/// Result type alias for WriterError
pub type WriterResult<T> = std::result::Result<T, WriterError>;

/// Outcome of running a single task inside a worker
#[derive(Debug)]
pub enum TaskOutcome {
    /// Task ran to completion
    Completed { label: String },

    /// Task stopped at a required step
    Failed { label: String, error: TaskError },

    /// Task panicked; the worker survived
    Panicked { label: String, message: String },
}

impl TaskOutcome {
    /// Returns true if this outcome represents success
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Completed { .. })
    }

    /// Returns the label of the task this outcome belongs to
    pub fn label(&self) -> &str {
        match self {
            TaskOutcome::Completed { label } => label,
            TaskOutcome::Failed { label, .. } => label,
            TaskOutcome::Panicked { label, .. } => label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_outcome() {
        let ok = TaskOutcome::Completed {
            label: "node:h1".into(),
        };
        assert!(ok.is_success());
        assert_eq!(ok.label(), "node:h1");

        let failed = TaskOutcome::Failed {
            label: "osd:h2".into(),
            error: TaskError::MissingParam {
                node: "h2".into(),
                name: "osd_id".into(),
            },
        };
        assert!(!failed.is_success());
        assert_eq!(failed.label(), "osd:h2");
    }

    #[test]
    fn test_error_conversion() {
        let err = DiscoveryError::QueryFailed {
            command: "ceph mon_status".into(),
            output: "timeout".into(),
        };
        let top: CollectError = err.into();
        assert!(matches!(top, CollectError::Discovery(_)));
        assert!(top.to_string().contains("mon_status"));
    }
}
