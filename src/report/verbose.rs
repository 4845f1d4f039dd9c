use colored::Colorize;
use std::io::Write;

use super::stats::{Aggregator, HostStats};
use super::Reporter;
use crate::runtime::{TaskResult, TaskStatus};

/// One line per finished task, then a per-host recap
pub struct VerboseReporter<W: Write> {
    out: W,
}

impl VerboseReporter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write> VerboseReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

pub fn format_result_line(stats: &HostStats, result: &TaskResult) -> String {
    let status = match (result.status, result.changed) {
        (TaskStatus::Failed, _) => "failed".red().bold(),
        (TaskStatus::Skipped, _) => "skipped".cyan(),
        (TaskStatus::Success, true) => "changed".yellow(),
        (TaskStatus::Success, false) => "ok".green(),
    };
    let label = result
        .task
        .as_ref()
        .map(|task| task.to_string())
        .unwrap_or_default();
    format!(
        "[{}/{}] {} {:<8} {} ({:.2}s)",
        stats.done,
        stats.total.max(stats.done),
        result.host.bold(),
        status,
        label,
        result.duration.as_secs_f64()
    )
}

impl<W: Write> Reporter for VerboseReporter<W> {
    fn on_result(&mut self, stats: &HostStats, result: &TaskResult) {
        let _ = writeln!(self.out, "{}", format_result_line(stats, result));
        if result.changed || result.is_failed() {
            for line in result.trimmed_output() {
                let _ = writeln!(self.out, "    {}", line.dimmed());
            }
        }
    }

    fn finish(&mut self, aggregator: &Aggregator) {
        let _ = writeln!(self.out);
        for (host, stats) in aggregator.hosts() {
            let _ = writeln!(
                self.out,
                "{:<24} ok={:<4} changed={:<4} failed={:<4} skipped={:<4}",
                host.bold(),
                stats.ok,
                stats.changed,
                stats.failed,
                stats.skipped
            );
        }
    }
}
