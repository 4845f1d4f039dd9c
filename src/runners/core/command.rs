//! Shell and command runners - execute commands on the target

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::playbook::{Task, POSITIONAL_ARG};
use crate::runners::{
    error::RunnerError,
    interface::{RunContext, Runner, RunnerSpec},
};
use crate::runtime::TaskResult;

const COMMAND_ARGS: &[&str] = &["chdir", "creates"];

/// Runs the positional argument through `bash -c`
pub struct ShellRunner;

/// Splits the positional argument shell-style and executes it without a shell
pub struct CommandRunner;

#[async_trait]
impl Runner for ShellRunner {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn spec(&self) -> RunnerSpec {
        RunnerSpec {
            required_args: &[POSITIONAL_ARG],
            optional_args: COMMAND_ARGS,
            ..Default::default()
        }
    }

    async fn run(&self, task: &mut Task, _ctx: &RunContext<'_>) -> Result<TaskResult, RunnerError> {
        if let Some(result) = already_created(task) {
            return Ok(result);
        }
        let script = task.arg_str(POSITIONAL_ARG).unwrap_or_default();
        let argv = vec!["bash".to_string(), "-c".to_string(), script.to_string()];
        run_system(&argv, task.arg_str("chdir")).await
    }
}

#[async_trait]
impl Runner for CommandRunner {
    fn name(&self) -> &'static str {
        "command"
    }

    fn spec(&self) -> RunnerSpec {
        RunnerSpec {
            required_args: &[POSITIONAL_ARG],
            optional_args: COMMAND_ARGS,
            ..Default::default()
        }
    }

    async fn run(&self, task: &mut Task, _ctx: &RunContext<'_>) -> Result<TaskResult, RunnerError> {
        if let Some(result) = already_created(task) {
            return Ok(result);
        }
        let argv = shell_words::split(task.arg_str(POSITIONAL_ARG).unwrap_or_default())?;
        if argv.is_empty() {
            return Err(RunnerError::missing(self.name(), POSITIONAL_ARG));
        }
        run_system(&argv, task.arg_str("chdir")).await
    }
}

fn already_created(task: &Task) -> Option<TaskResult> {
    let creates = task.arg_str("creates")?;
    Path::new(creates)
        .exists()
        .then(|| TaskResult::success(format!("skipped, {creates} exists\n")))
}

/// Run a program and capture its combined output. The result always reports a
/// change; a non-zero exit yields a failed result carrying the command line.
pub(crate) async fn run_system(
    argv: &[String],
    chdir: Option<&str>,
) -> Result<TaskResult, RunnerError> {
    let (program, args) = argv.split_first().ok_or_else(|| RunnerError::InvalidArgument {
        arg: POSITIONAL_ARG.to_string(),
        reason: "empty command".to_string(),
    })?;

    debug!("Executing {:?}", argv);
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = chdir {
        cmd.current_dir(dir);
    }

    let output = cmd.output().await.map_err(|source| RunnerError::Spawn {
        command: program.clone(),
        source,
    })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        Ok(TaskResult::success(combined).changed(true))
    } else {
        Ok(TaskResult::failed(format!(
            "{}\n{}:\n{}",
            argv.join(" "),
            output.status,
            combined
        ))
        .changed(true))
    }
}
