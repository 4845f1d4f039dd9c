use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use crate::playbook::Task;

/// Outcome of one task or handler. There is no unset state: every result is
/// built through a constructor that picks one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Success => "ok",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

/// Task execution result, streamed from the agent back to the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Host identifier, stamped by the controller as records arrive
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
    #[serde(default)]
    pub play_idx: usize,
    #[serde(default)]
    pub task_idx: usize,
    pub status: TaskStatus,
    #[serde(default)]
    pub changed: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default, with = "serde_duration")]
    pub duration: Duration,
    /// Echo of the originating task, internal arguments stripped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    /// Handlers notified from inside the runner, on top of `task.notify`
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub notify: BTreeSet<String>,
}

impl TaskResult {
    fn with_status(status: TaskStatus, output: impl Into<String>) -> Self {
        Self {
            host: String::new(),
            play_idx: 0,
            task_idx: 0,
            status,
            changed: false,
            output: output.into(),
            duration: Duration::ZERO,
            task: None,
            notify: BTreeSet::new(),
        }
    }

    pub fn success(output: impl Into<String>) -> Self {
        Self::with_status(TaskStatus::Success, output)
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self::with_status(TaskStatus::Failed, output)
    }

    pub fn skipped(output: impl Into<String>) -> Self {
        Self::with_status(TaskStatus::Skipped, output)
    }

    pub fn changed(mut self, changed: bool) -> Self {
        self.changed = changed;
        self
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.task = Some(task);
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }

    /// Every handler this result asks for, provided it reports a change
    pub fn notified_handlers(&self) -> BTreeSet<String> {
        if !self.changed {
            return BTreeSet::new();
        }
        let mut handlers = self.notify.clone();
        if let Some(task) = &self.task {
            handlers.extend(task.notify.iter().cloned());
        }
        handlers
    }

    /// Runner name of the echoed task, if any
    pub fn runner(&self) -> &str {
        self.task.as_ref().map(|t| t.runner.as_str()).unwrap_or("")
    }

    /// Output lines with surrounding whitespace removed, empty lines dropped
    pub fn trimmed_output(&self) -> Vec<&str> {
        self.output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect()
    }
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TaskResult {} from {} ({:.2} sec)",
            self.runner(),
            self.host,
            self.duration.as_secs_f64()
        )
    }
}

mod serde_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_micros() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let micros = u64::deserialize(deserializer)?;
        Ok(Duration::from_micros(micros))
    }
}
