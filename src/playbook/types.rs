use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Variable bindings at job, play or task scope
pub type Vars = HashMap<String, serde_json::Value>;

/// Arguments handed to a runner
pub type TaskArgs = HashMap<String, serde_json::Value>;

/// Key holding the positional remainder of a shorthand argument string
pub const POSITIONAL_ARG: &str = "_args";

/// Reserved argument key carrying a materialized asset tree
pub const ASSETS_ARG: &str = "_assets";

/// Ordered list of plays compiled from one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub plays: Vec<Play>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Play {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub vars: Vars,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub handlers: Vec<Task>,
    /// Shell commands run once on the controller before any host work
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_run: Vec<String>,
}

/// One declarative action, dispatched to exactly one runner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub runner: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub args: TaskArgs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unless: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notify: Vec<String>,
    #[serde(default, rename = "loop", skip_serializing_if = "Vec::is_empty")]
    pub loop_items: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub vars: Vars,
}

impl Playbook {
    pub fn new(plays: Vec<Play>) -> Self {
        Self { plays }
    }

    pub fn len(&self) -> usize {
        self.plays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plays.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Play> {
        self.plays.iter()
    }

    /// Keep only tasks carrying at least one of `tags`. Handlers are untouched.
    pub fn retain_tagged(&mut self, tags: &[String]) {
        if tags.is_empty() {
            return;
        }
        for play in &mut self.plays {
            play.tasks
                .retain(|task| task.tags.iter().any(|tag| tags.contains(tag)));
        }
    }
}

impl Play {
    /// Number of results a host running this play reports when nothing fails
    pub fn result_count(&self) -> usize {
        self.tasks.len() + self.handlers.len()
    }
}

impl Task {
    pub fn new(runner: impl Into<String>) -> Self {
        Self {
            runner: runner.into(),
            ..Default::default()
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_notify(mut self, handler: impl Into<String>) -> Self {
        self.notify.push(handler.into());
        self
    }

    /// String argument, or `None` when absent or not a string
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(|v| v.as_str())
    }

    /// Boolean argument; accepts YAML-ish strings such as `yes` and `false`
    pub fn arg_bool(&self, key: &str) -> Option<bool> {
        match self.args.get(key)? {
            serde_json::Value::Bool(b) => Some(*b),
            serde_json::Value::String(s) => match s.to_lowercase().as_str() {
                "yes" | "true" | "on" | "1" => Some(true),
                "no" | "false" | "off" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Argument as a list of strings. A bare string becomes a single item.
    pub fn arg_list(&self, key: &str) -> Vec<String> {
        match self.args.get(key) {
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Copy of this task without internal bulk arguments, used when echoing it back
    pub fn stripped(&self) -> Task {
        let mut task = self.clone();
        task.strip_internal_args();
        task
    }

    pub fn strip_internal_args(&mut self) {
        self.args.retain(|key, _| !key.starts_with(ASSETS_ARG));
    }

    /// Short label used in logs and reports
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            self.runner.clone()
        } else {
            format!("{} ({})", self.name, self.runner)
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self
            .args
            .keys()
            .filter(|k| !k.starts_with(ASSETS_ARG))
            .collect();
        keys.sort();
        write!(f, "{}", self.runner)?;
        for key in keys {
            match &self.args[key] {
                serde_json::Value::String(s) if key == POSITIONAL_ARG => write!(f, " {s}")?,
                serde_json::Value::String(s) => write!(f, " {key}={s}")?,
                other => write!(f, " {key}={other}")?,
            }
        }
        Ok(())
    }
}
