//! Configuration types for ceph-collect
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::collectors::{CollectorSet, DEFAULT_COLLECTORS};
use crate::context::CollectSettings;
use crate::error::ConfigError;
use crate::filter::PathFilter;
use crate::output::WriterOptions;
use crate::pool::{DEFAULT_POOL_SIZE, MAX_POOL_SIZE};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Collect diagnostic data from a Ceph cluster into one archive
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ceph-collect",
    version,
    about = "Collect diagnostic data from a Ceph cluster into one archive",
    long_about = "Discovers the cluster from the local ceph CLI, then runs commands locally \
                  and over ssh on every monitor and OSD host in parallel.\n\n\
                  Everything collected is written to a temporary folder tree which is \
                  packed into a .tar.gz archive at the end of the run.",
    after_help = "EXAMPLES:\n    \
        ceph-collect -r /tmp/cluster.tar.gz\n    \
        ceph-collect -p 16 -u 120 --collectors ceph,node,resource,performance\n    \
        ceph-collect -d smartctl -d 'osd/\\d+/journal' --keep-folder"
)]
pub struct CliArgs {
    /// Ceph cluster config file
    #[arg(short = 'c', long, default_value = "/etc/ceph/ceph.conf", value_name = "FILE")]
    pub conf: String,

    /// Ceph admin keyring
    #[arg(
        short = 'k',
        long,
        default_value = "/etc/ceph/ceph.client.admin.keyring",
        value_name = "FILE"
    )]
    pub key: String,

    /// Console log level
    #[arg(short = 'l', long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Number of parallel collection workers
    #[arg(short = 'p', long, default_value_t = DEFAULT_POOL_SIZE, value_name = "NUM")]
    pub pool_size: usize,

    /// Sampling time for vmstat/iostat/top
    #[arg(short = 's', long, default_value = "60", value_name = "SECS")]
    pub performance_collect_seconds: u64,

    /// Time between the two resource usage samples
    #[arg(short = 'u', long, default_value = "60", value_name = "SECS")]
    pub usage_collect_interval: u64,

    /// Skip artifacts whose path matches this regex (can be repeated)
    #[arg(short = 'd', long = "disable", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub disable: Vec<String>,

    /// Lines taken from the tail of each daemon log
    #[arg(long, default_value = "1000", value_name = "NUM")]
    pub ceph_log_max_lines: usize,

    /// Collectors to run (comma separated)
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = DEFAULT_COLLECTORS.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        value_name = "NAMES"
    )]
    pub collectors: Vec<String>,

    /// Skip `pg dump` above this many placement groups
    #[arg(long, default_value = "32768", value_name = "NUM")]
    pub max_pg_dump_count: u64,

    /// Archive file to create (default: <output folder>.tar.gz)
    #[arg(short = 'r', long, value_name = "FILE")]
    pub result: Option<PathBuf>,

    /// Keep the output folder after archiving
    #[arg(short = 'f', long)]
    pub keep_folder: bool,

    /// Store JSON outputs as returned instead of re-indenting them
    #[arg(short = 'j', long)]
    pub no_pretty_json: bool,

    /// Extra ssh `-o` option (can be repeated)
    #[arg(long = "ssh-opt", value_name = "OPT", action = clap::ArgAction::Append)]
    pub ssh_opts: Vec<String>,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

/// Console log verbosity
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive understood by `EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct CollectConfig {
    /// Settings shared with every collection task
    pub settings: CollectSettings,

    /// Number of worker threads
    pub pool_size: usize,

    /// Minimum time between the start of phase 1 and phase 2
    pub usage_interval: Duration,

    /// Compiled exclusion patterns
    pub filter: PathFilter,

    /// Enabled collectors
    pub collectors: CollectorSet,

    /// Output writer switches
    pub writer: WriterOptions,

    /// Archive destination, if not derived from the output folder
    pub result: Option<PathBuf>,

    /// Keep the output folder after archiving
    pub keep_folder: bool,

    /// ssh `-o` options added to the defaults
    pub ssh_options: Vec<String>,

    pub log_level: LogLevel,

    /// Show progress indicator
    pub show_progress: bool,
}

impl CollectConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if args.pool_size == 0 || args.pool_size > MAX_POOL_SIZE {
            return Err(ConfigError::InvalidPoolSize {
                count: args.pool_size,
                max: MAX_POOL_SIZE,
            });
        }

        let filter = PathFilter::new(&args.disable)?;
        let collectors = CollectorSet::select(&args.collectors)?;

        if let Some(result) = &args.result {
            if result.as_os_str().is_empty() || result.is_dir() {
                return Err(ConfigError::InvalidOutputPath {
                    path: result.clone(),
                    reason: "must be a file path".to_string(),
                });
            }

            // Only the archive itself is created, not its folder
            if let Some(parent) = result.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(ConfigError::InvalidOutputPath {
                        path: result.clone(),
                        reason: "parent directory does not exist".to_string(),
                    });
                }
            }
        }

        Ok(Self {
            settings: CollectSettings {
                ceph_conf: args.conf,
                ceph_key: args.key,
                ceph_log_max_lines: args.ceph_log_max_lines,
                performance_collect_seconds: args.performance_collect_seconds,
                max_pg_dump_count: args.max_pg_dump_count,
            },
            pool_size: args.pool_size,
            usage_interval: Duration::from_secs(args.usage_collect_interval),
            filter,
            collectors,
            writer: WriterOptions {
                pretty_json: !args.no_pretty_json,
            },
            result: args.result,
            keep_folder: args.keep_folder,
            ssh_options: args.ssh_opts,
            log_level: args.log_level,
            show_progress: !args.quiet,
        })
    }

    /// Whether the run has a second (resample) phase
    pub fn two_phase(&self) -> bool {
        self.collectors.usage().is_some()
    }
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            settings: CollectSettings::default(),
            pool_size: DEFAULT_POOL_SIZE,
            usage_interval: Duration::from_secs(60),
            filter: PathFilter::allow_all(),
            collectors: CollectorSet::default(),
            writer: WriterOptions::default(),
            result: None,
            keep_folder: false,
            ssh_options: Vec::new(),
            log_level: LogLevel::Info,
            show_progress: false,
        }
    }
}
