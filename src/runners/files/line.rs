//! lineinfile and authorized_key runners

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::playbook::Task;
use crate::runners::{
    error::RunnerError,
    files::utils::{current_user, ensure_ownership, lookup_user, set_mode, UserEntry},
    interface::{RunContext, Runner, RunnerSpec},
};
use crate::runtime::TaskResult;

/// Ensures `line` is present in the file at `path`, appending it if missing
pub struct LineInFileRunner;

/// Ensures an SSH public key is listed in a user's `~/.ssh/authorized_keys`
pub struct AuthorizedKeyRunner;

#[async_trait]
impl Runner for LineInFileRunner {
    fn name(&self) -> &'static str {
        "lineinfile"
    }

    fn spec(&self) -> RunnerSpec {
        RunnerSpec {
            required_args: &["path", "line"],
            ..Default::default()
        }
    }

    async fn run(&self, task: &mut Task, _ctx: &RunContext<'_>) -> Result<TaskResult, RunnerError> {
        let path = task
            .arg_str("path")
            .ok_or_else(|| RunnerError::missing(self.name(), "path"))?;
        let line = task
            .arg_str("line")
            .ok_or_else(|| RunnerError::missing(self.name(), "line"))?;

        let changed = ensure_line_in_file(Path::new(path), line).await?;
        Ok(TaskResult::success("").changed(changed))
    }
}

#[async_trait]
impl Runner for AuthorizedKeyRunner {
    fn name(&self) -> &'static str {
        "authorized_key"
    }

    fn spec(&self) -> RunnerSpec {
        RunnerSpec {
            required_args: &["key"],
            optional_args: &["user"],
            ..Default::default()
        }
    }

    async fn run(&self, task: &mut Task, _ctx: &RunContext<'_>) -> Result<TaskResult, RunnerError> {
        let key = task
            .arg_str("key")
            .ok_or_else(|| RunnerError::missing(self.name(), "key"))?;

        let user = match task.arg_str("user").filter(|u| !u.is_empty()) {
            Some(name) => lookup_user(name).ok_or_else(|| RunnerError::UnknownUser {
                name: name.to_string(),
            })?,
            None => current_user().ok_or_else(|| RunnerError::UnknownUser {
                name: "(current user)".to_string(),
            })?,
        };

        let changed = install_key(&user, key).await?;
        Ok(
            TaskResult::success(format!("Installed authorized_key for {}\n", user.name))
                .changed(changed),
        )
    }
}

async fn install_key(user: &UserEntry, key: &str) -> Result<bool, RunnerError> {
    let ssh_dir = user.home.join(".ssh");
    let mut changed = false;

    match tokio::fs::metadata(&ssh_dir).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tokio::fs::create_dir_all(&ssh_dir)
                .await
                .map_err(|e| RunnerError::io("mkdir", &ssh_dir, e))?;
            set_mode(&ssh_dir, 0o700).await?;
            changed = true;
        }
        Err(e) => return Err(RunnerError::io("stat", &ssh_dir, e)),
    }

    let auth_file = ssh_dir.join("authorized_keys");
    let created = tokio::fs::metadata(&auth_file).await.is_err();
    if ensure_line_in_file(&auth_file, key).await? {
        changed = true;
    }
    if created {
        set_mode(&auth_file, 0o600).await?;
    }

    for path in [&ssh_dir, &auth_file] {
        if ensure_ownership(path, Some(user.uid), Some(user.gid)).await? {
            changed = true;
        }
    }
    Ok(changed)
}

/// Append `line` unless the file already has an identical line. Returns
/// whether the file was modified.
pub async fn ensure_line_in_file(path: &Path, line: &str) -> Result<bool, RunnerError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.contains('\n') {
        return Err(RunnerError::InvalidArgument {
            arg: "line".to_string(),
            reason: "line cannot contain a newline".to_string(),
        });
    }

    let existing = match tokio::fs::read(path).await {
        Ok(data) => Some(data),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => return Err(RunnerError::io("read", path, e)),
    };

    let mut addition = String::new();
    if let Some(data) = &existing {
        let content = String::from_utf8_lossy(data);
        if content.lines().any(|found| found == line) {
            return Ok(false);
        }
        if !data.is_empty() && !data.ends_with(b"\n") {
            addition.push('\n');
        }
    }
    addition.push_str(line);
    addition.push('\n');

    debug!("Appending line to {}", path.display());
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await
        .map_err(|e| RunnerError::io("open", path, e))?;
    file.write_all(addition.as_bytes())
        .await
        .map_err(|e| RunnerError::io("write", path, e))?;
    file.flush()
        .await
        .map_err(|e| RunnerError::io("write", path, e))?;
    Ok(true)
}
