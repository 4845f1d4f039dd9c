//! Result reporting: live progress or line-per-task output, host counters
//! and the failure digest

pub mod progress;
pub mod stats;
pub mod verbose;

use colored::Colorize;
use std::fmt::Write as _;
use tokio::sync::mpsc;

pub use progress::ProgressReporter;
pub use stats::{Aggregator, HostStats};
pub use verbose::{format_result_line, VerboseReporter};

use crate::runtime::TaskResult;

pub trait Reporter {
    /// Called once per result, after `stats` has been updated with it
    fn on_result(&mut self, stats: &HostStats, result: &TaskResult);

    fn finish(&mut self, aggregator: &Aggregator);
}

/// Drain the result channel into `aggregator`, feeding `reporter` as each
/// result arrives. Returns once every host unit has dropped its sender.
pub async fn consume(
    mut results: mpsc::Receiver<TaskResult>,
    aggregator: &mut Aggregator,
    reporter: &mut dyn Reporter,
) {
    while let Some(result) = results.recv().await {
        let stats = aggregator.record(&result);
        reporter.on_result(&stats, &result);
    }
    reporter.finish(aggregator);
}

/// Host and trimmed output of every failed result, or `None` when nothing
/// failed
pub fn failure_digest(aggregator: &Aggregator) -> Option<String> {
    if !aggregator.has_failures() {
        return None;
    }

    let mut digest = String::new();
    let _ = writeln!(digest, "{}", "FAILURES".red().bold());
    for result in aggregator.failures() {
        let label = result
            .task
            .as_ref()
            .map(|task| task.label())
            .unwrap_or_default();
        let _ = writeln!(digest, "{} {}", result.host.bold(), label);
        for line in result.trimmed_output() {
            let _ = writeln!(digest, "    {}", line.red());
        }
    }
    Some(digest)
}
