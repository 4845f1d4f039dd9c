use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::options::ConvergeCli;
use crate::config::ControllerConfig;
use crate::deploy::{
    assemble_jobs, AgentInstaller, LocalTransport, Orchestrator, OrchestratorSettings,
    SshTransport, Transport,
};
use crate::playbook::{Playbook, PlaybookCompiler};
use crate::protocol::Job;
use crate::report::{self, Aggregator, ProgressReporter, Reporter, VerboseReporter};
use crate::runners::RunnerRegistry;
use crate::runtime::{prepare_playbook, Dispatcher};

/// Apply command line flags on top of the loaded configuration
pub fn apply_overrides(config: &mut ControllerConfig, cli: &ConvergeCli) {
    if let Some(compression) = cli.compression {
        config.compression = compression;
    }
    if let Some(dir) = &cli.agent_dir {
        config.agent.dir = dir.clone();
    }
    if cli.no_install {
        config.agent.install = false;
    }
    if cli.no_sudo {
        config.agent.sudo = false;
    }
}

/// Compile the playbook and run its controller-side phases. Nothing on any
/// host is touched yet.
pub async fn load_playbook(
    cli: &ConvergeCli,
    config: &ControllerConfig,
    registry: &Arc<RunnerRegistry>,
) -> Result<Playbook> {
    let compilation = PlaybookCompiler::new(registry)
        .compile_file(&cli.playbook)
        .with_context(|| format!("Failed to compile {}", cli.playbook.display()))?;
    info!(
        "Compiled {} plays ({} unused fields)",
        compilation.playbook.len(),
        compilation.warnings.len()
    );

    let mut playbook = compilation.playbook;
    playbook.retain_tagged(&cli.tags);

    let base_dir = playbook_dir(&cli.playbook);
    let dispatcher = Dispatcher::new(Arc::clone(registry))
        .with_vault(Arc::new(config.vault.build()))
        .with_base_dir(&base_dir);
    let prepared = prepare_playbook(&mut playbook, &dispatcher, &cli.job_vars(), &base_dir)
        .await
        .context("Controller preparation failed")?;
    info!("Prepared {} tasks on the controller", prepared);
    Ok(playbook)
}

/// Full controller run. Returns `Ok(false)` when any host reported a failure.
pub async fn run_converge(cli: &ConvergeCli) -> Result<bool> {
    let mut config = ControllerConfig::load(cli.config.as_deref(), &cli.playbook)?;
    apply_overrides(&mut config, cli);

    let registry = Arc::new(RunnerRegistry::with_core_runners());
    let playbook = load_playbook(cli, &config, &registry).await?;

    let mut jobs = assemble_jobs(&playbook, &cli.job_vars());
    if !cli.limit.is_empty() {
        jobs.retain(|host, _| cli.limit.contains(host));
    }
    if jobs.is_empty() {
        warn!("No hosts matched; nothing to do");
        return Ok(true);
    }

    if cli.dry_run {
        for (host, job) in &jobs {
            print_job(host, job);
        }
        return Ok(true);
    }

    let transport: Arc<dyn Transport> = if cli.local {
        Arc::new(LocalTransport::new(Arc::clone(&registry), config.compression))
    } else {
        Arc::new(SshTransport::new((&config.ssh).into()))
    };

    let settings = OrchestratorSettings {
        remote_path: config.agent.remote_path.clone(),
        sudo: config.agent.sudo,
        compression: config.compression,
        agent_verbosity: cli.verbose.saturating_sub(1),
    };
    let mut orchestrator = Orchestrator::new(transport, settings);
    if config.agent.install {
        orchestrator = orchestrator.with_installer(AgentInstaller::new(
            config.agent.dir.clone(),
            config.agent.remote_path.clone(),
        ));
    }

    let mut aggregator = Aggregator::new(
        jobs.iter()
            .map(|(host, job)| (host.clone(), job.result_count())),
    );
    info!("Converging {} hosts", jobs.len());
    let results = orchestrator.launch(jobs);

    let mut reporter: Box<dyn Reporter> = if cli.verbose > 0 {
        Box::new(VerboseReporter::stdout())
    } else {
        Box::new(ProgressReporter::new())
    };
    report::consume(results, &mut aggregator, reporter.as_mut()).await;

    match report::failure_digest(&aggregator) {
        Some(digest) => {
            eprintln!("{digest}");
            Ok(false)
        }
        None => Ok(true),
    }
}

fn playbook_dir(playbook: &Path) -> PathBuf {
    match playbook.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn print_job(host: &str, job: &Job) {
    println!("{host}: {} results expected", job.result_count());
    for play in &job.plays {
        println!("  play {}", play.name);
        for task in &play.tasks {
            println!("    {task}");
        }
        for handler in &play.handlers {
            println!("    handler {}: {handler}", handler.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_overrides_win_over_config() {
        let cli = ConvergeCli::try_parse_from([
            "rustle-converge",
            "site.yml",
            "--no-sudo",
            "--no-install",
            "--agent-dir",
            "/opt/agents",
        ])
        .unwrap();
        let mut config = ControllerConfig::default();
        apply_overrides(&mut config, &cli);
        assert!(!config.agent.sudo && !config.agent.install);
        assert_eq!(config.agent.dir, PathBuf::from("/opt/agents"));
    }

    #[test]
    fn test_playbook_dir() {
        assert_eq!(playbook_dir(Path::new("site.yml")), PathBuf::from("."));
        assert_eq!(playbook_dir(Path::new("ops/site.yml")), PathBuf::from("ops"));
    }

    #[tokio::test]
    async fn test_local_converge() {
        let dir = TempDir::new().unwrap();
        let playbook = dir.path().join("site.yml");
        std::fs::write(
            &playbook,
            "- hosts: localhost\n  tasks:\n    - shell: echo converged\n",
        )
        .unwrap();

        let cli = ConvergeCli::try_parse_from([
            "rustle-converge",
            playbook.to_str().unwrap(),
            "--local",
            "-v",
        ])
        .unwrap();
        assert!(run_converge(&cli).await.unwrap());

        std::fs::write(&playbook, "- hosts: localhost\n  tasks:\n    - shell: exit 2\n").unwrap();
        assert!(!run_converge(&cli).await.unwrap());
    }
}
