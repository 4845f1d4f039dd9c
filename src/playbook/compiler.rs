//! Playbook compiler: generic document -> normalized task lists

use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, warn};

use crate::playbook::{
    args::{parse_arg_string, split_list},
    error::CompileError,
    types::{Play, Playbook, Task, TaskArgs, Vars},
};
use crate::runners::RunnerRegistry;

const PLAY_KEYS: &[&str] = &["name", "hosts", "vars", "tasks", "handlers", "pre_run"];

/// Result of a successful compilation
#[derive(Debug, Clone)]
pub struct Compilation {
    pub playbook: Playbook,
    /// Keys the compiler did not recognize, reported but not fatal
    pub warnings: Vec<String>,
}

/// Compiles a declarative document into a [`Playbook`]. Runner names are
/// validated against the registry it was built with.
pub struct PlaybookCompiler<'a> {
    registry: &'a RunnerRegistry,
}

impl<'a> PlaybookCompiler<'a> {
    pub fn new(registry: &'a RunnerRegistry) -> Self {
        Self { registry }
    }

    pub fn compile_file(&self, path: &Path) -> Result<Compilation, CompileError> {
        let source = std::fs::read_to_string(path).map_err(|source| CompileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.compile_str(&source)
    }

    pub fn compile_str(&self, source: &str) -> Result<Compilation, CompileError> {
        let document: serde_yaml::Value = serde_yaml::from_str(source)?;
        let document = serde_json::to_value(&document).map_err(|e| CompileError::Malformed {
            reason: e.to_string(),
        })?;
        self.compile(&document)
    }

    /// Compile an already parsed document
    pub fn compile(&self, document: &Value) -> Result<Compilation, CompileError> {
        let mut warnings = Vec::new();

        let raw_plays = match document {
            Value::Null => return Ok(Compilation {
                playbook: Playbook::default(),
                warnings,
            }),
            Value::Array(plays) => plays,
            other => {
                return Err(CompileError::Malformed {
                    reason: format!(
                        "top level must be a sequence of plays, got {}",
                        type_name(other)
                    ),
                })
            }
        };

        let mut plays = Vec::with_capacity(raw_plays.len());
        for (idx, raw_play) in raw_plays.iter().enumerate() {
            plays.push(self.compile_play(idx, raw_play, &mut warnings)?);
        }

        let mut playbook = Playbook::new(plays);
        expand_loops(&mut playbook);

        for play in playbook.iter() {
            for host in &play.hosts {
                debug!("Found playbook target: {}", host);
            }
        }
        for warning in &warnings {
            warn!("Unused field in playbook: {}", warning);
        }

        Ok(Compilation { playbook, warnings })
    }

    fn compile_play(
        &self,
        idx: usize,
        raw: &Value,
        warnings: &mut Vec<String>,
    ) -> Result<Play, CompileError> {
        let map = expect_object(raw, &format!("play[{idx}]"))?;
        let mut play = Play::default();

        if let Some(name) = map.get("name") {
            play.name = expect_string(name, "play.name")?;
        }
        let label = if play.name.is_empty() {
            format!("play[{idx}]")
        } else {
            play.name.clone()
        };

        for key in map.keys().filter(|k| !PLAY_KEYS.contains(&k.as_str())) {
            warnings.push(format!("{label}: {key}"));
        }

        if let Some(hosts) = map.get("hosts") {
            play.hosts = string_or_list(hosts, "play.hosts")?;
        }
        if let Some(vars) = map.get("vars") {
            play.vars = expect_vars(vars, "play.vars")?;
        }
        if let Some(pre_run) = map.get("pre_run") {
            play.pre_run = match pre_run {
                Value::String(cmd) => vec![cmd.clone()],
                other => list_of_strings(other, "play.pre_run")?,
            };
        }
        if let Some(tasks) = map.get("tasks") {
            play.tasks = self.compile_tasks(&label, tasks, warnings)?;
        }
        if let Some(handlers) = map.get("handlers") {
            play.handlers = self.compile_tasks(&label, handlers, warnings)?;
        }

        Ok(play)
    }

    fn compile_tasks(
        &self,
        play: &str,
        raw: &Value,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<Task>, CompileError> {
        match raw {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items
                .iter()
                .map(|item| self.compile_task(play, item, warnings))
                .collect(),
            other => Err(CompileError::UnexpectedType {
                field: format!("{play}.tasks"),
                expected: "sequence".to_string(),
                actual: type_name(other).to_string(),
            }),
        }
    }

    /// Resolve the runner-keyed task shorthand into an explicit [`Task`]
    fn compile_task(
        &self,
        play: &str,
        raw: &Value,
        warnings: &mut Vec<String>,
    ) -> Result<Task, CompileError> {
        let map = expect_object(raw, &format!("{play}.task"))?;
        let mut task = Task::default();
        let mut runner: Option<String> = None;
        let mut explicit_args: Option<TaskArgs> = None;

        for (key, value) in map {
            if self.registry.contains(key) || key == "runner" {
                let name = if key == "runner" {
                    expect_string(value, "task.runner")?
                } else {
                    key.clone()
                };
                if let Some(first) = &runner {
                    return Err(CompileError::DuplicateRunner {
                        first: first.clone(),
                        second: name,
                    });
                }
                if key != "runner" {
                    task.args = runner_args(key, value)?;
                }
                runner = Some(name);
                continue;
            }

            match key.as_str() {
                "name" => task.name = expect_string(value, "task.name")?,
                "args" => explicit_args = Some(expect_vars(value, "task.args")?),
                "unless" => task.unless = Some(expect_string(value, "task.unless")?),
                "notify" => task.notify = string_or_list(value, "task.notify")?,
                "tags" => task.tags = string_or_list(value, "task.tags")?,
                "vars" => task.vars = expect_vars(value, "task.vars")?,
                "loop" => {
                    task.loop_items = match value {
                        Value::Array(items) => items.clone(),
                        Value::Null => Vec::new(),
                        other => {
                            return Err(CompileError::UnexpectedType {
                                field: "task.loop".to_string(),
                                expected: "sequence".to_string(),
                                actual: type_name(other).to_string(),
                            })
                        }
                    }
                }
                _ => warnings.push(format!("{play}: task key {key}")),
            }
        }

        task.runner = runner.ok_or_else(|| CompileError::MissingRunner {
            known: self.registry.names().join(", "),
        })?;
        if let Some(args) = explicit_args {
            task.args.extend(args);
        }
        if !self.registry.contains(&task.runner) {
            return Err(CompileError::InvalidTask {
                play: play.to_string(),
                reason: format!("unknown runner '{}'", task.runner),
            });
        }

        Ok(task)
    }
}

/// Replace every task carrying a loop with one clone per loop item. Each clone
/// binds `item` in its scoped vars and has its loop cleared.
pub fn expand_loops(playbook: &mut Playbook) {
    for play in &mut playbook.plays {
        // back to front so indices of unvisited tasks stay valid
        for idx in (0..play.tasks.len()).rev() {
            if play.tasks[idx].loop_items.is_empty() {
                continue;
            }
            let template = play.tasks[idx].clone();
            let expanded: Vec<Task> = template
                .loop_items
                .iter()
                .map(|item| {
                    let mut task = template.clone();
                    task.loop_items.clear();
                    task.vars.insert("item".to_string(), item.clone());
                    task
                })
                .collect();
            debug!(
                "Expanded loop of task {} into {} tasks",
                template.label(),
                expanded.len()
            );
            play.tasks.splice(idx..=idx, expanded);
        }
    }
}

fn runner_args(runner: &str, value: &Value) -> Result<TaskArgs, CompileError> {
    match value {
        Value::String(shorthand) => Ok(parse_arg_string(shorthand)),
        Value::Object(map) => Ok(map.clone().into_iter().collect()),
        Value::Null => Ok(TaskArgs::new()),
        other => Err(CompileError::UnexpectedType {
            field: format!("arguments of {runner}"),
            expected: "string or mapping".to_string(),
            actual: type_name(other).to_string(),
        }),
    }
}

fn expect_object<'v>(
    value: &'v Value,
    field: &str,
) -> Result<&'v Map<String, Value>, CompileError> {
    value.as_object().ok_or_else(|| CompileError::UnexpectedType {
        field: field.to_string(),
        expected: "mapping".to_string(),
        actual: type_name(value).to_string(),
    })
}

fn expect_string(value: &Value, field: &str) -> Result<String, CompileError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(CompileError::UnexpectedType {
            field: field.to_string(),
            expected: "string".to_string(),
            actual: type_name(other).to_string(),
        }),
    }
}

fn expect_vars(value: &Value, field: &str) -> Result<Vars, CompileError> {
    match value {
        Value::Null => Ok(Vars::new()),
        Value::Object(map) => Ok(map.clone().into_iter().collect()),
        other => Err(CompileError::UnexpectedType {
            field: field.to_string(),
            expected: "mapping".to_string(),
            actual: type_name(other).to_string(),
        }),
    }
}

/// Weakly typed list: `"a, b"`, `[a, b]` and `[a, "b, c"]` are all accepted
fn string_or_list(value: &Value, field: &str) -> Result<Vec<String>, CompileError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(split_list(s)),
        Value::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                out.extend(split_list(&expect_string(item, field)?));
            }
            Ok(out)
        }
        other => Err(CompileError::UnexpectedType {
            field: field.to_string(),
            expected: "string or sequence".to_string(),
            actual: type_name(other).to_string(),
        }),
    }
}

fn list_of_strings(value: &Value, field: &str) -> Result<Vec<String>, CompileError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items.iter().map(|i| expect_string(i, field)).collect(),
        other => Err(CompileError::UnexpectedType {
            field: field.to_string(),
            expected: "sequence".to_string(),
            actual: type_name(other).to_string(),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
