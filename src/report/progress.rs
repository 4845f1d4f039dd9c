//! Live display: one progress bar per host

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;

use super::stats::{Aggregator, HostStats};
use super::Reporter;
use crate::runtime::TaskResult;

const BAR_TEMPLATE: &str = "{prefix:>20.bold} [{bar:30.cyan/blue}] {pos}/{len} {msg}";

pub struct ProgressReporter {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
    style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// Progress bars that draw nowhere; for tests and non-interactive runs
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: HashMap::new(),
            style,
        }
    }

    fn bar(&mut self, host: &str, total: usize) -> &ProgressBar {
        let multi = &self.multi;
        let style = &self.style;
        self.bars.entry(host.to_string()).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(total as u64));
            bar.set_style(style.clone());
            bar.set_prefix(host.to_string());
            bar
        })
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ProgressReporter {
    fn on_result(&mut self, stats: &HostStats, result: &TaskResult) {
        // a failed host stops early, so never let the bar overshoot its length
        let total = stats.total.max(stats.done);
        let bar = self.bar(&result.host, total);
        bar.set_length(total as u64);
        bar.set_position(stats.done as u64);
        bar.set_message(format!(
            "ok={} changed={} failed={} skipped={}",
            stats.ok, stats.changed, stats.failed, stats.skipped
        ));
    }

    fn finish(&mut self, _aggregator: &Aggregator) {
        for bar in self.bars.values() {
            bar.finish();
        }
    }
}
