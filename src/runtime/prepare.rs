//! Controller-side preparation before any host is contacted

use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

use crate::playbook::{Playbook, Vars};
use crate::runtime::dispatch::{merge_vars, Dispatcher};
use crate::runtime::error::ExecutionError;

/// Run every play's `pre_run` commands in `base_dir`, then the pre-run phase
/// of every task and handler that declares one. Stops at the first failure.
pub async fn prepare_playbook(
    playbook: &mut Playbook,
    dispatcher: &Dispatcher,
    job_vars: &Vars,
    base_dir: &Path,
) -> Result<usize, ExecutionError> {
    for play in &playbook.plays {
        for command in &play.pre_run {
            run_controller_command(command, base_dir).await?;
        }
    }

    let mut prepared = 0;
    for play in &mut playbook.plays {
        let inherited = merge_vars(&[job_vars, &play.vars]);
        for task in play.tasks.iter_mut().chain(play.handlers.iter_mut()) {
            let declares_pre_run = dispatcher
                .registry()
                .get(&task.runner)
                .is_some_and(|runner| runner.spec().pre_run);
            if !declares_pre_run {
                continue;
            }

            debug!("Pre-run of {}", task.label());
            let result = dispatcher.pre_run(task, &inherited).await;
            if result.is_failed() {
                return Err(ExecutionError::PreRunFailed {
                    task: task.label(),
                    output: result.output.trim().to_string(),
                });
            }
            prepared += 1;
        }
    }
    Ok(prepared)
}

async fn run_controller_command(command: &str, base_dir: &Path) -> Result<(), ExecutionError> {
    info!("Running controller command: {}", command);
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(base_dir)
        .output()
        .await?;

    if !output.status.success() {
        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(ExecutionError::ControllerCommand {
            command: command.to_string(),
            output: format!("{}: {}", output.status, combined.trim()),
        });
    }
    Ok(())
}
