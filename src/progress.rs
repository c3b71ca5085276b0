//! Progress reporting for collection runs
//!
//! Provides a live spinner while phases drain, plus the header and summary
//! printed around a run.

use crate::coordinator::{RunPhase, RunReport};
use crate::pool::PoolProgress;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Progress reporter that displays run status
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, phase: RunPhase, progress: &PoolProgress) {
        let msg = format!(
            "{} | Tasks: {}/{} | Pending: {} | Workers: {}",
            style(phase).cyan(),
            format_number(progress.completed),
            format_number(progress.submitted),
            progress.pending,
            progress.workers,
        );

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a header at the start of the run
pub fn print_header(conf: &str, workers: usize, collectors: &[&str], output: &Path) {
    println!();
    println!(
        "{} {}",
        style("ceph-collect").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Cluster:").bold(), conf);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Collectors:").bold(), collectors.join(","));
    println!("  {} {}", style("Output:").bold(), output.display());
    println!();
}

/// Print a summary of the run
pub fn print_summary(report: &RunReport, archive: Option<(&Path, u64)>) {
    println!();
    println!("{}", style("Collection Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Hosts:").bold(), format_number(report.hosts as u64));

    for phase in &report.phases {
        println!(
            "  {} {} tasks in {:.1}s",
            style(format!("{}:", phase.phase)).bold(),
            format_number(phase.tasks),
            phase.duration.as_secs_f64()
        );
    }

    println!(
        "  {} {} ({})",
        style("Artifacts:").bold(),
        format_number(report.writer.artifacts_written),
        format_size(report.writer.bytes_written, BINARY)
    );
    println!(
        "  {} {:.1}s",
        style("Duration:").bold(),
        report.duration.as_secs_f64()
    );

    let failed = report.total_failed();
    if failed > 0 {
        println!("  {} {}", style("Failed tasks:").yellow().bold(), format_number(failed));
    }
    if report.writer.failed_commands > 0 {
        println!(
            "  {} {}",
            style("Failed commands:").yellow().bold(),
            format_number(report.writer.failed_commands)
        );
    }
    if report.writer.write_errors > 0 {
        println!(
            "  {} {}",
            style("Write errors:").red().bold(),
            format_number(report.writer.write_errors)
        );
    }

    match archive {
        Some((path, size)) => println!(
            "  {} {} ({})",
            style("Archive:").bold(),
            path.display(),
            format_size(size, BINARY)
        ),
        None => println!("  {} {}", style("Folder:").bold(), report.root.display()),
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }
}
