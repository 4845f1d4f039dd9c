//! Service runner - manages systemd units through systemctl

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::playbook::Task;
use crate::runners::{
    core::command::run_system,
    error::RunnerError,
    interface::{RunContext, Runner, RunnerSpec},
};
use crate::runtime::TaskResult;

/// Service runner - manages systemd units through systemctl
pub struct ServiceRunner;

impl ServiceRunner {
    async fn systemctl_succeeds(args: &[&str]) -> Result<bool, RunnerError> {
        let status = Command::new("systemctl")
            .args(args)
            .status()
            .await
            .map_err(|source| RunnerError::Spawn {
                command: "systemctl".to_string(),
                source,
            })?;
        Ok(status.success())
    }

    fn action_for_state(state: &str) -> Result<&'static str, RunnerError> {
        match state {
            "started" => Ok("start"),
            "stopped" => Ok("stop"),
            "restarted" => Ok("restart"),
            "reloaded" => Ok("reload"),
            other => Err(RunnerError::InvalidArgument {
                arg: "state".to_string(),
                reason: format!("unknown state {other}, try started|stopped|restarted|reloaded"),
            }),
        }
    }
}

#[async_trait]
impl Runner for ServiceRunner {
    fn name(&self) -> &'static str {
        "service"
    }

    fn spec(&self) -> RunnerSpec {
        RunnerSpec {
            required_args: &["name", "state"],
            optional_args: &["enabled"],
            ..Default::default()
        }
    }

    async fn run(&self, task: &mut Task, _ctx: &RunContext<'_>) -> Result<TaskResult, RunnerError> {
        let name = task
            .arg_str("name")
            .ok_or_else(|| RunnerError::missing(self.name(), "name"))?
            .to_string();
        let state = task
            .arg_str("state")
            .ok_or_else(|| RunnerError::missing(self.name(), "state"))?;
        let action = Self::action_for_state(state)?;

        let mut actions = Vec::new();
        match action {
            "start" | "stop" => {
                let active =
                    Self::systemctl_succeeds(&["is-active", "--quiet", name.as_str()]).await?;
                if active != (action == "start") {
                    actions.push(action);
                }
            }
            _ => actions.push(action),
        }

        if let Some(enabled) = task.arg_bool("enabled") {
            let is_enabled =
                Self::systemctl_succeeds(&["is-enabled", "--quiet", name.as_str()]).await?;
            if is_enabled != enabled {
                actions.push(if enabled { "enable" } else { "disable" });
            }
        }

        if actions.is_empty() {
            return Ok(TaskResult::success(format!(
                "service {name} is already {state}\n"
            )));
        }

        let mut output = String::new();
        for action in actions {
            debug!("systemctl {} {}", action, name);
            let argv = vec!["systemctl".to_string(), action.to_string(), name.clone()];
            let result = run_system(&argv, None).await?;
            if result.is_failed() {
                return Ok(result);
            }
            output.push_str(&format!("{action} {name}\n"));
            output.push_str(&result.output);
        }
        Ok(TaskResult::success(output).changed(true))
    }
}
