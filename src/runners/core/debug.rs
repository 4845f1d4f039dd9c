//! Debug runner - echoes a message or a variable

use async_trait::async_trait;

use crate::playbook::{Task, POSITIONAL_ARG};
use crate::runners::{
    error::RunnerError,
    interface::{RunContext, Runner, RunnerSpec},
};
use crate::runtime::TaskResult;

/// Debug runner - echoes a message or a variable, never changes anything
pub struct DebugRunner;

#[async_trait]
impl Runner for DebugRunner {
    fn name(&self) -> &'static str {
        "debug"
    }

    fn spec(&self) -> RunnerSpec {
        RunnerSpec {
            optional_args: &["msg", "var"],
            ..Default::default()
        }
    }

    async fn run(&self, task: &mut Task, ctx: &RunContext<'_>) -> Result<TaskResult, RunnerError> {
        let output = if let Some(var) = task.arg_str("var") {
            match ctx.vars.get(var) {
                Some(value) => format!("{var}: {}", serde_json::to_string_pretty(value)?),
                None => format!("{var}: VARIABLE IS NOT DEFINED!"),
            }
        } else {
            task.arg_str("msg")
                .or_else(|| task.arg_str(POSITIONAL_ARG).filter(|s| !s.is_empty()))
                .unwrap_or("Hello world!")
                .to_string()
        };

        Ok(TaskResult::success(format!("{output}\n")))
    }
}
