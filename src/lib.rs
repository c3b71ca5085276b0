//! ceph-collect - Parallel Ceph Cluster Diagnostics Collector
//!
//! Discovers a Ceph cluster's topology, runs a catalog of diagnostic
//! commands locally and over ssh on every host in parallel, and stores each
//! output as a file in a run-scoped folder tree that is archived at the end.
//!
//! # Features
//!
//! - **Topology Discovery**: Monitors and OSD hosts are read from the local
//!   `ceph` CLI; every host also gets the generic node collection.
//!
//! - **Parallel Collection**: A fixed pool of worker threads runs one task
//!   per (collector, role, node, service); a failing host or command never
//!   stops the others.
//!
//! - **Single Writer**: All artifacts go through one writer thread, which
//!   owns the output tree and never overwrites a file.
//!
//! - **Two-Phase Usage Sampling**: Disk and network counters are sampled
//!   before and after the bulk collection, at least a configured interval
//!   apart.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       RunCoordinator                            │
//! │   Discovery ─► Topology ─► Tasks (collector x role x node)      │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ submit / drain
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Worker Threads                             │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐      │
//! │  │Worker 1 │  │Worker 2 │  │Worker 3 │  ...    │Worker N │      │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘      │
//! │       │  CommandExecutor (sh -c / ssh)               │          │
//! │       └────────────┼────────────┼────────────────────┘          │
//! │                    ▼            ▼                               │
//! │            ┌──────────────────────────┐                         │
//! │            │  PathFilter + Artifact   │                         │
//! │            └────────────┬─────────────┘                         │
//! │                         ▼                                       │
//! │            ┌──────────────────────────┐                         │
//! │            │      ResultWriter        │                         │
//! │            │  (single thread)         │                         │
//! │            └──────────────────────────┘                         │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//!                    ┌──────────────────┐
//!                    │  output folder   │
//!                    │  -> .tar.gz      │
//!                    └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Default collectors, archive next to the temp folder
//! ceph-collect
//!
//! # Fewer workers, skip SMART data, keep the folder
//! ceph-collect -p 16 -d smartctl --keep-folder -r cluster.tar.gz
//! ```

pub mod artifact;
pub mod collectors;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod exec;
pub mod filter;
pub mod output;
pub mod pool;
pub mod progress;
pub mod topology;

pub use artifact::{normalize_path, Artifact, Format};
pub use config::{CliArgs, CollectConfig, LogLevel};
pub use coordinator::{RunCoordinator, RunPhase, RunReport};
pub use error::{CollectError, Result};
pub use exec::{CommandExecutor, CommandOutput, CommandSpec, ShellExecutor, Target};
pub use filter::PathFilter;
pub use topology::{CephDiscovery, Discovery, Params, Role, Topology};
