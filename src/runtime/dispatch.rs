//! Dispatch engine: templating, validation and fault isolation around runners

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::assets::Vault;
use crate::playbook::{Task, Vars, ASSETS_ARG};
use crate::runners::{
    RunContext, Runner, RunnerError, RunnerRegistry, RunnerSpec, TemplateEngine,
};
use crate::runtime::state::TaskResult;

/// Shallow merge; later layers win on top-level key collisions
pub fn merge_vars(layers: &[&Vars]) -> Vars {
    let mut merged = Vars::new();
    for layer in layers {
        merged.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

/// Runs single tasks. Every call returns a result; runner errors and panics
/// become failed results.
pub struct Dispatcher {
    registry: Arc<RunnerRegistry>,
    templates: TemplateEngine,
    vault: Arc<Vault>,
    base_dir: PathBuf,
}

impl Dispatcher {
    pub fn new(registry: Arc<RunnerRegistry>) -> Self {
        Self {
            registry,
            templates: TemplateEngine::new(),
            vault: Arc::new(Vault::new()),
            base_dir: PathBuf::from("."),
        }
    }

    pub fn with_vault(mut self, vault: Arc<Vault>) -> Self {
        self.vault = vault;
        self
    }

    /// Directory relative paths in pre-run arguments resolve against
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn registry(&self) -> &RunnerRegistry {
        &self.registry
    }

    /// Execute `task` with `inherited` (job and play scope) variables
    pub async fn run(&self, mut task: Task, inherited: &Vars) -> TaskResult {
        let start = Instant::now();

        let Some(runner) = self.registry.get(&task.runner) else {
            warn!("No runner registered for '{}'", task.runner);
            return TaskResult::failed(format!("Runner '{}' not found\n", task.runner))
                .with_task(task.stripped());
        };

        let spec = runner.spec();
        let mut result = if spec.local_only {
            TaskResult::skipped(format!("{} runs on the controller only\n", task.runner))
        } else {
            let vars = merge_vars(&[inherited, &task.vars]);
            self.execute(runner, &spec, &mut task, &vars).await
        };

        result.duration = start.elapsed();
        result.with_task(task.stripped())
    }

    /// Controller-side phase, for runners that declare one. The phase sees
    /// templated arguments, but only the asset payload it produces is kept on
    /// `task`; every other argument ships unrendered and is templated once,
    /// on the agent.
    pub async fn pre_run(&self, task: &mut Task, inherited: &Vars) -> TaskResult {
        let start = Instant::now();

        let Some(runner) = self.registry.get(&task.runner) else {
            return TaskResult::failed(format!("Runner '{}' not found\n", task.runner))
                .with_task(task.stripped());
        };
        if !runner.spec().pre_run {
            return TaskResult::skipped("").with_task(task.stripped());
        }

        let vars = merge_vars(&[inherited, &task.vars]);
        let mut rendered = task.clone();
        let mut result = match self.render_args(&mut rendered, &vars) {
            Err(e) => TaskResult::failed(format!("{e}\n")),
            Ok(()) => {
                let ctx = self.context(&vars);
                guarded(runner.name(), runner.pre_run(&mut rendered, &ctx)).await
            }
        };
        task.args.extend(
            rendered
                .args
                .into_iter()
                .filter(|(key, _)| key.starts_with(ASSETS_ARG)),
        );

        result.duration = start.elapsed();
        result.with_task(task.stripped())
    }

    async fn execute(
        &self,
        runner: &dyn Runner,
        spec: &RunnerSpec,
        task: &mut Task,
        vars: &Vars,
    ) -> TaskResult {
        if let Err(e) = self
            .render_args(task, vars)
            .and_then(|_| validate_args(runner.name(), spec, task))
        {
            return TaskResult::failed(format!("{e}\n"));
        }

        if let Some(guard) = task.unless.clone() {
            match unless_holds(&guard).await {
                Ok(true) => {
                    debug!("Skipping {}: unless guard '{}' holds", task.label(), guard);
                    return TaskResult::success(format!("skipped, unless '{guard}' succeeded\n"));
                }
                Ok(false) => {}
                Err(e) => return TaskResult::failed(format!("{e}\n")),
            }
        }

        debug!("Running {}", task.label());
        let ctx = self.context(vars);
        guarded(runner.name(), runner.run(task, &ctx)).await
    }

    fn context<'a>(&'a self, vars: &'a Vars) -> RunContext<'a> {
        RunContext {
            vars,
            templates: &self.templates,
            base_dir: &self.base_dir,
            vault: &self.vault,
        }
    }

    /// Template every string argument and the unless guard. Asset payloads
    /// are never templated here.
    fn render_args(&self, task: &mut Task, vars: &Vars) -> Result<(), RunnerError> {
        for (key, value) in task.args.iter_mut() {
            if key.starts_with(ASSETS_ARG) {
                continue;
            }
            *value = self
                .templates
                .render_value(value, vars)
                .map_err(|e| RunnerError::InvalidArgument {
                    arg: key.clone(),
                    reason: e.to_string(),
                })?;
        }
        if let Some(guard) = task.unless.as_mut() {
            *guard = self.templates.render(guard, vars)?;
        }
        Ok(())
    }
}

/// Required arguments must be present; string ones must also be non-empty
pub fn validate_args(runner: &str, spec: &RunnerSpec, task: &Task) -> Result<(), RunnerError> {
    for &arg in spec.required_args {
        match task.args.get(arg) {
            None => return Err(RunnerError::missing(runner, arg)),
            Some(serde_json::Value::String(s)) if s.trim().is_empty() => {
                return Err(RunnerError::missing(runner, arg))
            }
            Some(serde_json::Value::Null) => return Err(RunnerError::missing(runner, arg)),
            Some(_) => {}
        }
    }
    Ok(())
}

async fn unless_holds(guard: &str) -> Result<bool, RunnerError> {
    let status = Command::new("sh")
        .arg("-c")
        .arg(guard)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map_err(|source| RunnerError::Spawn {
            command: "sh".to_string(),
            source,
        })?;
    Ok(status.success())
}

/// Await a runner phase, converting errors and panics into failed results
async fn guarded<F>(runner: &str, phase: F) -> TaskResult
where
    F: std::future::Future<Output = Result<TaskResult, RunnerError>>,
{
    match AssertUnwindSafe(phase).catch_unwind().await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            debug!("Runner {} failed: {}", runner, e);
            TaskResult::failed(format!("{e}\n"))
        }
        Err(panic) => {
            warn!("Runner {} panicked", runner);
            TaskResult::failed(format!(
                "runner {runner} panicked: {}\n",
                panic_message(panic.as_ref())
            ))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playbook::POSITIONAL_ARG;
    use crate::runtime::TaskStatus;
    use async_trait::async_trait;
    use serde_json::json;

    struct Exploding;

    #[async_trait]
    impl Runner for Exploding {
        fn name(&self) -> &'static str {
            "explode"
        }

        async fn run(
            &self,
            _task: &mut Task,
            _ctx: &RunContext<'_>,
        ) -> Result<TaskResult, RunnerError> {
            panic!("boom");
        }
    }

    /// Echoes the templated `msg` argument and the `who` variable it saw
    struct Echo;

    #[async_trait]
    impl Runner for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn spec(&self) -> RunnerSpec {
            RunnerSpec {
                required_args: &["msg"],
                ..Default::default()
            }
        }

        async fn run(
            &self,
            task: &mut Task,
            ctx: &RunContext<'_>,
        ) -> Result<TaskResult, RunnerError> {
            Ok(TaskResult::success(format!(
                "{} {}",
                task.arg_str("msg").unwrap_or_default(),
                ctx.vars["who"]
            ))
            .changed(true))
        }
    }

    /// Pre-run stores the `msg` it saw as its asset payload; run echoes `msg`
    struct Stamp;

    #[async_trait]
    impl Runner for Stamp {
        fn name(&self) -> &'static str {
            "stamp"
        }

        fn spec(&self) -> RunnerSpec {
            RunnerSpec {
                pre_run: true,
                ..Default::default()
            }
        }

        async fn pre_run(
            &self,
            task: &mut Task,
            _ctx: &RunContext<'_>,
        ) -> Result<TaskResult, RunnerError> {
            let seen = task.args.get("msg").cloned().unwrap_or_default();
            task.args.insert(ASSETS_ARG.to_string(), seen);
            Ok(TaskResult::success(""))
        }

        async fn run(
            &self,
            task: &mut Task,
            _ctx: &RunContext<'_>,
        ) -> Result<TaskResult, RunnerError> {
            Ok(TaskResult::success(task.arg_str("msg").unwrap_or_default()))
        }
    }

    fn dispatcher() -> Dispatcher {
        let mut registry = RunnerRegistry::with_core_runners();
        registry.register(Box::new(Exploding));
        registry.register(Box::new(Echo));
        registry.register(Box::new(Stamp));
        Dispatcher::new(Arc::new(registry))
    }

    fn vars(value: serde_json::Value) -> Vars {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_runner_fails() {
        let result = dispatcher().run(Task::new("nope"), &Vars::new()).await;
        assert_eq!(result.status, TaskStatus::Failed);
        assert!(result.output.contains("nope"));
        assert_eq!(result.runner(), "nope");
    }

    #[tokio::test]
    async fn test_panic_becomes_failed_result() {
        let result = dispatcher().run(Task::new("explode"), &Vars::new()).await;
        assert_eq!(result.status, TaskStatus::Failed);
        assert!(result.output.contains("boom"));
        assert!(result.task.is_some());
    }

    #[tokio::test]
    async fn test_task_vars_override_inherited() {
        let mut task = Task::new("echo").with_arg("msg", "hello {{ who }}");
        task.vars = vars(json!({"who": "task"}));
        let result = dispatcher()
            .run(task, &vars(json!({"who": "play"})))
            .await;
        assert_eq!(result.output, "hello task \"task\"");
        assert_eq!(result.task.unwrap().arg_str("msg"), Some("hello task"));
    }

    #[tokio::test]
    async fn test_undefined_variable_fails_task() {
        let task = Task::new("echo").with_arg("msg", "{{ nobody }}");
        let result = dispatcher().run(task, &vars(json!({"who": "x"}))).await;
        assert_eq!(result.status, TaskStatus::Failed);
        assert!(result.output.contains("nobody"));
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let result = dispatcher()
            .run(Task::new("echo").with_arg("msg", "  "), &Vars::new())
            .await;
        assert_eq!(result.status, TaskStatus::Failed);
        assert!(result.output.contains("msg"));
    }

    #[tokio::test]
    async fn test_local_only_runner_is_skipped() {
        let task = Task::new("local_action").with_arg(POSITIONAL_ARG, "{{ undefined }}");
        let result = dispatcher().run(task, &Vars::new()).await;
        assert_eq!(result.status, TaskStatus::Skipped);
    }

    #[tokio::test]
    async fn test_unless_guard_short_circuits() {
        let mut task = Task::new("shell").with_arg(POSITIONAL_ARG, "exit 3");
        task.unless = Some("test {{ n }} -eq 1".to_string());

        let held = dispatcher().run(task.clone(), &vars(json!({"n": 1}))).await;
        assert_eq!(held.status, TaskStatus::Success);
        assert!(!held.changed);

        let not_held = dispatcher().run(task, &vars(json!({"n": 2}))).await;
        assert_eq!(not_held.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_pre_run_skipped_without_phase() {
        let mut task = Task::new("shell").with_arg(POSITIONAL_ARG, "true");
        let result = dispatcher().pre_run(&mut task, &Vars::new()).await;
        assert_eq!(result.status, TaskStatus::Skipped);
    }

    #[tokio::test]
    async fn test_pre_run_leaves_arguments_for_the_agent() {
        let braces = vars(json!({"banner": "literal {{ braces }}"}));
        let mut task = Task::new("stamp").with_arg("msg", "{{ banner }}");

        let prepared = dispatcher().pre_run(&mut task, &braces).await;
        assert_eq!(prepared.status, TaskStatus::Success, "{}", prepared.output);
        assert_eq!(task.arg_str("msg"), Some("{{ banner }}"));
        assert_eq!(task.args[ASSETS_ARG], json!("literal {{ braces }}"));

        let result = dispatcher().run(task, &braces).await;
        assert_eq!(result.status, TaskStatus::Success, "{}", result.output);
        assert_eq!(result.output, "literal {{ braces }}");
    }

    #[test]
    fn test_merge_is_shallow() {
        let job = vars(json!({"a": 1, "nested": {"x": 1, "y": 2}}));
        let play = vars(json!({"nested": {"x": 9}}));
        let merged = merge_vars(&[&job, &play]);
        assert_eq!(merged["a"], json!(1));
        assert_eq!(merged["nested"], json!({"x": 9}));
    }
}
