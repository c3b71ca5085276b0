//! ceph-collect - Parallel Ceph Cluster Diagnostics Collector
//!
//! Entry point for the CLI application.

use anyhow::{bail, Context, Result};
use ceph_collect::config::{CliArgs, CollectConfig, LogLevel};
use ceph_collect::coordinator::RunCoordinator;
use ceph_collect::exec::{shell_quote, CommandExecutor, CommandSpec, ShellExecutor};
use ceph_collect::progress::{print_header, print_summary, ProgressReporter};
use ceph_collect::topology::CephDiscovery;
use chrono::Local;
use clap::Parser;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args = CliArgs::parse();

    let config = CollectConfig::from_args(args).context("Invalid configuration")?;

    let executor = Arc::new(ShellExecutor::new().with_ssh_options(config.ssh_options.clone()));

    // Everything below shells out to the ceph CLI
    let which = executor.execute(&CommandSpec::local("which ceph"));
    if !which.success {
        eprintln!("Error: no 'ceph' command found in PATH, is this a ceph admin node?");
        return Ok(ExitCode::FAILURE);
    }

    let root = output_root();
    fs::create_dir_all(&root)
        .with_context(|| format!("Cannot create output folder {}", root.display()))?;

    setup_logging(config.log_level, &root.join("log.txt"))?;
    info!(root = %root.display(), "Output folder created");

    if config.show_progress {
        print_header(
            &config.settings.ceph_conf,
            config.pool_size,
            &config.collectors.names(),
            &root,
        );
    }

    let progress = config.show_progress.then(ProgressReporter::new);

    let mut coordinator = RunCoordinator::new(config.clone(), &root, executor.clone());
    if let Some(p) = &progress {
        p.set_status("Discovering cluster...");
        let p = p.clone();
        coordinator =
            coordinator.with_progress(Box::new(move |phase, pool| p.update(phase, &pool)));
    }

    let discovery = CephDiscovery::new(&*executor, config.settings.ceph_cmd());
    let report = coordinator.run(&discovery);

    if let Some(p) = &progress {
        match &report {
            Ok(_) => p.finish("Collection completed"),
            Err(_) => p.finish("Collection failed"),
        }
    }

    let report = report.context("Collection failed")?;

    let result = config
        .result
        .clone()
        .unwrap_or_else(|| root.with_extension("tar.gz"));
    archive(&*executor, &root, &result)?;

    let size = fs::metadata(&result).map(|m| m.len()).unwrap_or(0);
    info!(archive = %result.display(), bytes = size, "Archive created");

    if !config.keep_folder {
        if let Err(e) = fs::remove_dir_all(&root) {
            warn!(root = %root.display(), error = %e, "Cannot remove output folder");
        }
    }

    if config.show_progress {
        print_summary(&report, Some((result.as_path(), size)));
    } else {
        println!("{}", result.display());
    }

    if report.total_failed() > 0 {
        info!(failed = report.total_failed(), "Collection completed with failed tasks");
    }

    Ok(ExitCode::SUCCESS)
}

/// Fresh run-scoped folder under the system temp dir
fn output_root() -> PathBuf {
    std::env::temp_dir().join(format!(
        "ceph-collect-{}-{}",
        Local::now().format("%Y%m%d_%H%M%S"),
        std::process::id()
    ))
}

/// `tar` invocation packing `root` into `result`
fn archive_command(root: &Path, result: &Path) -> String {
    format!(
        "tar -zcf {} -C {} .",
        shell_quote(&result.to_string_lossy()),
        shell_quote(&root.to_string_lossy())
    )
}

/// Pack the output folder into a gzipped tarball
fn archive(executor: &dyn CommandExecutor, root: &Path, result: &Path) -> Result<()> {
    let out = executor.execute(&CommandSpec::local(archive_command(root, result)));

    if !out.success {
        bail!(
            "Failed to create archive {}: {} (output kept in {})",
            result.display(),
            out.text().trim(),
            root.display()
        );
    }

    Ok(())
}

/// Console logging at the requested level plus a full debug log in the
/// output folder
fn setup_logging(level: LogLevel, log_path: &Path) -> Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ceph_collect={}", level.as_filter())));

    let file = File::create(log_path)
        .with_context(|| format!("Cannot create log file {}", log_path.display()))?;

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter);

    let log_file = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .with_filter(EnvFilter::new("ceph_collect=debug"));

    tracing_subscriber::registry()
        .with(console)
        .with(log_file)
        .try_init()
        .context("Failed to install logging")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_command_quotes_paths() {
        let cmd = archive_command(
            Path::new("/tmp/ceph-collect-20240101_000000-42"),
            Path::new("/tmp/my dump.tar.gz"),
        );
        assert_eq!(
            cmd,
            "tar -zcf '/tmp/my dump.tar.gz' -C /tmp/ceph-collect-20240101_000000-42 ."
        );

        let cmd = archive_command(Path::new("/tmp/out"), Path::new("/tmp/x;rm -rf y.tgz"));
        assert!(cmd.starts_with("tar -zcf '/tmp/x;rm -rf y.tgz' -C"));
    }

    #[test]
    fn test_archive_path_with_space() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("collected data");
        fs::create_dir_all(root.join("hosts/h1")).unwrap();
        fs::write(root.join("hosts/h1/uname.txt"), "Linux").unwrap();

        // Stand-in for tar that only records its arguments
        let result = dir.path().join("my dump.tar.gz");
        let cmd = archive_command(&root, &result).replacen("tar -zcf", "printf '%s\\n'", 1);
        let out = ShellExecutor::new().execute(&CommandSpec::local(cmd));

        assert!(out.success);
        let args: Vec<String> = out.text().lines().map(str::to_string).collect();
        assert_eq!(
            args,
            vec![
                result.to_string_lossy().into_owned(),
                "-C".to_string(),
                root.to_string_lossy().into_owned(),
                ".".to_string(),
            ]
        );
    }
}
