//! Apt runner - manages Debian packages

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

const APT_GET: &str = "apt-get";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackageState {
    Present,
    Latest,
    Absent,
    Purged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstallStatus {
    Installed,
    /// Removed, configuration files left behind
    ConfigFiles,
    Missing,
}

impl PackageState {
    fn parse(state: Option<&str>) -> Result<Self, RunnerError> {
        match state.unwrap_or("present") {
            "present" | "install" | "installed" => Ok(PackageState::Present),
            "latest" => Ok(PackageState::Latest),
            "absent" | "remove" | "removed" => Ok(PackageState::Absent),
            "purge" | "purged" => Ok(PackageState::Purged),
            other => Err(RunnerError::InvalidArgument {
                arg: "state".to_string(),
                reason: format!("invalid state {other}, try present|latest|absent|purge"),
            }),
        }
    }

    fn apt_action(self) -> &'static str {
        match self {
            PackageState::Present | PackageState::Latest => "install",
            PackageState::Absent => "remove",
            PackageState::Purged => "purge",
        }
    }

    /// Whether a package in `status` needs the action for this state
    fn needs_action(self, status: InstallStatus) -> bool {
        match self {
            PackageState::Present => status != InstallStatus::Installed,
            PackageState::Latest => true,
            PackageState::Absent => status == InstallStatus::Installed,
            PackageState::Purged => status != InstallStatus::Missing,
        }
    }
}

/// Apt runner - installs, upgrades and removes packages with apt-get
pub struct AptRunner;

impl AptRunner {
    async fn install_status(package: &str) -> Result<InstallStatus, RunnerError> {
        let output = Command::new("dpkg-query")
            .args(["-W", "-f=${Status}", package])
            .output()
            .await
            .map_err(|source| RunnerError::Spawn {
                command: "dpkg-query".to_string(),
                source,
            })?;
        Ok(parse_dpkg_status(&String::from_utf8_lossy(&output.stdout)))
    }

    fn build_command(state: PackageState, packages: &[String]) -> Vec<String> {
        let mut argv: Vec<String> = [
            "env",
            "DEBIAN_FRONTEND=noninteractive",
            APT_GET,
            "-y",
            "-q",
            state.apt_action(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        argv.extend(packages.iter().cloned());
        argv
    }
}

#[async_trait]
impl Runner for AptRunner {
    fn name(&self) -> &'static str {
        "apt"
    }

    fn spec(&self) -> RunnerSpec {
        RunnerSpec {
            required_args: &["name"],
            optional_args: &["state", "update_cache"],
            ..Default::default()
        }
    }

    async fn run(&self, task: &mut Task, _ctx: &RunContext<'_>) -> Result<TaskResult, RunnerError> {
        let state = PackageState::parse(task.arg_str("state"))?;
        let packages: Vec<String> = task
            .arg_list("name")
            .iter()
            .flat_map(|name| crate::playbook::split_list(name))
            .collect();
        if packages.is_empty() {
            return Err(RunnerError::missing(self.name(), "name"));
        }

        let mut output = String::new();
        if task.arg_bool("update_cache").unwrap_or(false) {
            let argv = [APT_GET.to_string(), "update".to_string(), "-q".to_string()];
            let update = run_system(&argv, None).await?;
            if update.is_failed() {
                return Ok(update);
            }
            output.push_str(&update.output);
        }

        let mut pending = Vec::new();
        for package in &packages {
            let status = Self::install_status(package).await?;
            debug!("Package {} is {:?}", package, status);
            if state.needs_action(status) {
                pending.push(package.clone());
            }
        }

        if pending.is_empty() {
            output.push_str(&format!("{} already {:?}\n", packages.join(" "), state));
            return Ok(TaskResult::success(output));
        }

        let result = run_system(&Self::build_command(state, &pending), None).await?;
        if result.is_failed() {
            return Ok(result);
        }
        let changed = state != PackageState::Latest
            || !result.output.contains("0 upgraded, 0 newly installed");
        output.push_str(&result.output);
        Ok(TaskResult::success(output).changed(changed))
    }
}

fn parse_dpkg_status(status: &str) -> InstallStatus {
    let status = status.trim();
    if status.ends_with(" installed") {
        InstallStatus::Installed
    } else if status.ends_with(" config-files") {
        InstallStatus::ConfigFiles
    } else {
        InstallStatus::Missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state() {
        assert_eq!(PackageState::parse(None).unwrap(), PackageState::Present);
        assert_eq!(PackageState::parse(Some("latest")).unwrap(), PackageState::Latest);
        assert_eq!(PackageState::parse(Some("purge")).unwrap(), PackageState::Purged);
        assert!(PackageState::parse(Some("sideways")).is_err());
    }

    #[test]
    fn test_dpkg_status() {
        assert_eq!(parse_dpkg_status("install ok installed"), InstallStatus::Installed);
        assert_eq!(parse_dpkg_status("deinstall ok config-files"), InstallStatus::ConfigFiles);
        assert_eq!(parse_dpkg_status(""), InstallStatus::Missing);
    }

    #[test]
    fn test_only_pending_packages_are_touched() {
        assert!(!PackageState::Present.needs_action(InstallStatus::Installed));
        assert!(PackageState::Present.needs_action(InstallStatus::ConfigFiles));
        assert!(!PackageState::Absent.needs_action(InstallStatus::ConfigFiles));
        assert!(PackageState::Purged.needs_action(InstallStatus::ConfigFiles));
        assert!(!PackageState::Purged.needs_action(InstallStatus::Missing));
    }

    #[test]
    fn test_build_command() {
        let argv = AptRunner::build_command(PackageState::Absent, &["curl".to_string()]);
        assert_eq!(
            argv,
            vec!["env", "DEBIAN_FRONTEND=noninteractive", "apt-get", "-y", "-q", "remove", "curl"]
        );
    }
}
