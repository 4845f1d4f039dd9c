//! Runner interface traits and types

use async_trait::async_trait;
use std::path::Path;

use crate::assets::Vault;
use crate::playbook::{Task, Vars};
use crate::runners::error::RunnerError;
use crate::runners::template_engine::TemplateEngine;
use crate::runtime::TaskResult;

/// Unified interface for every runner
#[async_trait]
pub trait Runner: Send + Sync {
    /// Runner name, also the task key selecting it (e.g. "shell", "tree")
    fn name(&self) -> &'static str;

    /// Argument metadata and phase markers
    fn spec(&self) -> RunnerSpec {
        RunnerSpec::default()
    }

    /// Execute the task against local state. Arguments are already templated.
    async fn run(&self, task: &mut Task, ctx: &RunContext<'_>) -> Result<TaskResult, RunnerError>;

    /// Controller-side phase, run before the task is shipped to any host.
    /// Only invoked when [`RunnerSpec::pre_run`] is set.
    async fn pre_run(
        &self,
        _task: &mut Task,
        _ctx: &RunContext<'_>,
    ) -> Result<TaskResult, RunnerError> {
        Ok(TaskResult::skipped("no pre-run phase"))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunnerSpec {
    pub required_args: &'static [&'static str],
    pub optional_args: &'static [&'static str],
    /// Has no remote body; the agent reports it as skipped
    pub local_only: bool,
    /// Declares a controller-side pre-run phase
    pub pre_run: bool,
}

/// Everything a runner may consult besides its task
pub struct RunContext<'a> {
    /// Effective variables for this task
    pub vars: &'a Vars,
    pub templates: &'a TemplateEngine,
    /// Directory relative paths in arguments resolve against (controller side)
    pub base_dir: &'a Path,
    pub vault: &'a Vault,
}
