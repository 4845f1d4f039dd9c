use std::collections::BTreeMap;

use crate::runtime::{TaskResult, TaskStatus};

/// Progress counters for one host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    /// Results expected when every task and handler of the host's job runs
    pub total: usize,
    pub done: usize,
    pub ok: usize,
    pub changed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl HostStats {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn record(&mut self, result: &TaskResult) {
        self.done += 1;
        match result.status {
            TaskStatus::Success => self.ok += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Skipped => self.skipped += 1,
        }
        if result.changed {
            self.changed += 1;
        }
    }
}

/// Sole consumer of the result channel: per-host counters plus every
/// failed result, kept in arrival order for the digest
#[derive(Debug, Default)]
pub struct Aggregator {
    hosts: BTreeMap<String, HostStats>,
    failures: Vec<TaskResult>,
}

impl Aggregator {
    /// `totals` maps each host to the number of results its job can produce
    pub fn new(totals: impl IntoIterator<Item = (String, usize)>) -> Self {
        Self {
            hosts: totals
                .into_iter()
                .map(|(host, total)| (host, HostStats::new(total)))
                .collect(),
            failures: Vec::new(),
        }
    }

    /// Count `result` against its host and return the host's updated stats
    pub fn record(&mut self, result: &TaskResult) -> HostStats {
        let stats = self.hosts.entry(result.host.clone()).or_default();
        stats.record(result);
        if result.is_failed() {
            self.failures.push(result.clone());
        }
        *stats
    }

    pub fn hosts(&self) -> &BTreeMap<String, HostStats> {
        &self.hosts
    }

    pub fn failures(&self) -> &[TaskResult] {
        &self.failures
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn totals(&self) -> HostStats {
        self.hosts.values().fold(HostStats::default(), |mut acc, s| {
            acc.total += s.total;
            acc.done += s.done;
            acc.ok += s.ok;
            acc.changed += s.changed;
            acc.failed += s.failed;
            acc.skipped += s.skipped;
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(host: &str, status: TaskStatus, changed: bool) -> TaskResult {
        let mut result = match status {
            TaskStatus::Success => TaskResult::success(""),
            TaskStatus::Failed => TaskResult::failed("boom"),
            TaskStatus::Skipped => TaskResult::skipped(""),
        }
        .changed(changed);
        result.host = host.to_string();
        result
    }

    #[test]
    fn test_aggregator_counts_per_host() {
        let mut agg = Aggregator::new([("h1".to_string(), 3), ("h2".to_string(), 1)]);
        agg.record(&result("h1", TaskStatus::Success, true));
        agg.record(&result("h1", TaskStatus::Skipped, false));
        let h2 = agg.record(&result("h2", TaskStatus::Failed, false));

        assert_eq!(h2.failed, 1);
        let h1 = agg.hosts()["h1"];
        assert_eq!((h1.total, h1.done, h1.ok, h1.changed, h1.skipped), (3, 2, 1, 1, 1));
        assert!(agg.has_failures());
        assert_eq!(agg.failures()[0].host, "h2");
        assert_eq!(agg.totals().done, 3);
    }

    #[test]
    fn test_skipped_is_not_a_failure() {
        let mut agg = Aggregator::default();
        agg.record(&result("h1", TaskStatus::Skipped, false));
        assert!(!agg.has_failures());
    }
}
