//! Local action runner - runs a command on the controller only

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::playbook::{Task, POSITIONAL_ARG};
use crate::runners::{
    error::RunnerError,
    interface::{RunContext, Runner, RunnerSpec},
};
use crate::runtime::TaskResult;

/// Runs its command on the controller during the pre-run phase. It has no
/// remote body, so agents report it as skipped.
pub struct LocalActionRunner;

#[async_trait]
impl Runner for LocalActionRunner {
    fn name(&self) -> &'static str {
        "local_action"
    }

    fn spec(&self) -> RunnerSpec {
        RunnerSpec {
            required_args: &[POSITIONAL_ARG],
            local_only: true,
            pre_run: true,
            ..Default::default()
        }
    }

    async fn run(
        &self,
        _task: &mut Task,
        _ctx: &RunContext<'_>,
    ) -> Result<TaskResult, RunnerError> {
        Err(RunnerError::Unsupported {
            runner: self.name().to_string(),
            phase: "remote".to_string(),
        })
    }

    async fn pre_run(
        &self,
        task: &mut Task,
        ctx: &RunContext<'_>,
    ) -> Result<TaskResult, RunnerError> {
        let script = task.arg_str(POSITIONAL_ARG).unwrap_or_default();
        info!("Running local action: {}", script);

        let output = Command::new("sh")
            .arg("-c")
            .arg(script)
            .current_dir(ctx.base_dir)
            .output()
            .await
            .map_err(|source| RunnerError::Spawn {
                command: "sh".to_string(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(TaskResult::success(combined).changed(true))
        } else {
            Ok(TaskResult::failed(format!(
                "local action '{script}' {}:\n{combined}",
                output.status
            )))
        }
    }
}
