//! Controller fan-out over the in-process transport and scripted fakes

use async_trait::async_trait;
use rustle_converge::deploy::{
    assemble_jobs, AgentInstaller, CommandOutput, Connection, DeployError, HostSpec,
    LocalTransport, Orchestrator, OrchestratorSettings, RemoteProcess, Transport, TransportError,
    AGENT_RUNNER,
};
use rustle_converge::playbook::{Play, Playbook, Task, Vars, POSITIONAL_ARG};
use rustle_converge::protocol::Compression;
use rustle_converge::report::{self, Aggregator, ProgressReporter};
use rustle_converge::runners::RunnerRegistry;
use rustle_converge::runtime::{TaskResult, TaskStatus};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn playbook(hosts: &[&str], tasks: Vec<Task>) -> Playbook {
    Playbook::new(vec![Play {
        name: "e2e".to_string(),
        hosts: hosts.iter().map(|h| h.to_string()).collect(),
        tasks,
        ..Default::default()
    }])
}

fn local_orchestrator(compression: Compression) -> Orchestrator {
    let registry = Arc::new(RunnerRegistry::with_core_runners());
    let settings = OrchestratorSettings {
        compression,
        ..Default::default()
    };
    Orchestrator::new(Arc::new(LocalTransport::new(registry, compression)), settings)
}

async fn collect(mut rx: tokio::sync::mpsc::Receiver<TaskResult>) -> Vec<TaskResult> {
    let mut results = Vec::new();
    while let Some(result) = rx.recv().await {
        results.push(result);
    }
    results
}

#[tokio::test]
async fn test_two_hosts_echo() {
    let echo = Task::new("shell").with_arg(POSITIONAL_ARG, "echo hi");
    let jobs = assemble_jobs(&playbook(&["h1", "h2"], vec![echo]), &Vars::new());
    let results = collect(local_orchestrator(Compression::Zstd).launch(jobs)).await;

    assert_eq!(results.len(), 2);
    let mut hosts: Vec<&str> = results.iter().map(|r| r.host.as_str()).collect();
    hosts.sort();
    assert_eq!(hosts, vec!["h1", "h2"]);
    for result in &results {
        assert_eq!(result.status, TaskStatus::Success);
        assert!(result.changed);
        assert!(result.output.contains("hi\n"));
    }
}

#[tokio::test]
async fn test_failure_on_one_host_leaves_others() {
    let tasks = vec![
        Task::new("shell").with_arg(POSITIONAL_ARG, "exit {{ code }}"),
        Task::new("shell").with_arg(POSITIONAL_ARG, "echo after"),
    ];
    let mut book = playbook(&["ok-host"], tasks);
    book.plays[0].vars.insert("code".to_string(), 0.into());
    let mut failing = book.plays[0].clone();
    failing.hosts = vec!["bad-host".to_string()];
    failing.vars.insert("code".to_string(), 3.into());
    book.plays.push(failing);

    let jobs = assemble_jobs(&book, &Vars::new());
    let mut aggregator = Aggregator::new(jobs.iter().map(|(h, j)| (h.clone(), j.result_count())));
    let rx = local_orchestrator(Compression::None).launch(jobs);
    report::consume(rx, &mut aggregator, &mut ProgressReporter::hidden()).await;

    let ok = aggregator.hosts()["ok-host"];
    let bad = aggregator.hosts()["bad-host"];
    assert_eq!((ok.done, ok.failed), (2, 0));
    assert_eq!((bad.done, bad.failed), (1, 1));
    let digest = report::failure_digest(&aggregator).unwrap();
    assert!(digest.contains("bad-host"));
}

struct Unreachable;

#[async_trait]
impl Transport for Unreachable {
    async fn connect(&self, host: &HostSpec) -> Result<Box<dyn Connection>, TransportError> {
        Err(TransportError::Connect {
            host: host.to_string(),
            reason: "no route to host".to_string(),
        })
    }
}

#[tokio::test]
async fn test_connect_failure_becomes_failed_result() {
    let orchestrator = Orchestrator::new(Arc::new(Unreachable), OrchestratorSettings::default());
    let book = playbook(&["deploy@db1:2222"], vec![Task::new("debug")]);
    let jobs = assemble_jobs(&book, &Vars::new());
    let results = collect(orchestrator.launch(jobs)).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].host, "deploy@db1:2222");
    assert_eq!(results[0].status, TaskStatus::Failed);
    assert_eq!(results[0].runner(), AGENT_RUNNER);
    assert!(results[0].output.contains("no route to host"));
}

#[tokio::test]
async fn test_invalid_host_spec_fails_only_that_host() {
    let jobs = assemble_jobs(
        &playbook(&["good", "bad:port"], vec![Task::new("debug").with_arg("msg", "x")]),
        &Vars::new(),
    );
    let results = collect(local_orchestrator(Compression::Zstd).launch(jobs)).await;
    let by_host: BTreeMap<&str, TaskStatus> =
        results.iter().map(|r| (r.host.as_str(), r.status)).collect();
    assert_eq!(by_host["good"], TaskStatus::Success);
    assert_eq!(by_host["bad:port"], TaskStatus::Failed);
}

/// Connection that answers the install probe from a fixed script and
/// records uploads
struct ScriptedConnection {
    probe: String,
    uploads: Arc<Mutex<Vec<(String, u32, usize)>>>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn host(&self) -> &str {
        "scripted"
    }

    async fn run(&self, _command: &str) -> Result<CommandOutput, TransportError> {
        Ok(CommandOutput {
            success: true,
            status: "exit status: 0".to_string(),
            stdout: self.probe.clone(),
            stderr: String::new(),
        })
    }

    async fn upload_bytes(
        &self,
        data: &[u8],
        remote_path: &str,
        mode: u32,
    ) -> Result<(), TransportError> {
        self.uploads
            .lock()
            .unwrap()
            .push((remote_path.to_string(), mode, data.len()));
        Ok(())
    }

    async fn stream_exec(
        &self,
        _command: &str,
        _stdin: Vec<u8>,
    ) -> Result<RemoteProcess, TransportError> {
        unimplemented!("installer never streams")
    }
}

#[tokio::test]
async fn test_agent_uploaded_only_on_hash_mismatch() {
    let agents = TempDir::new().unwrap();
    std::fs::write(agents.path().join("rustle-agent-linux-x86_64"), b"agent build 1").unwrap();
    let installer = AgentInstaller::new(agents.path(), ".cache/rustle/agent");
    let uploads = Arc::new(Mutex::new(Vec::new()));

    let fresh = ScriptedConnection {
        probe: "Linux amd64\n".to_string(),
        uploads: Arc::clone(&uploads),
    };
    assert!(installer.ensure(&fresh).await.unwrap());
    assert_eq!(
        uploads.lock().unwrap().as_slice(),
        &[(".cache/rustle/agent".to_string(), 0o755, 13)]
    );

    let digest = rustle_converge::runners::files::utils::sha256_hex(b"agent build 1");
    let current = ScriptedConnection {
        probe: format!("Linux x86_64\n{digest}  .cache/rustle/agent\n"),
        uploads: Arc::clone(&uploads),
    };
    assert!(!installer.ensure(&current).await.unwrap());
    assert_eq!(uploads.lock().unwrap().len(), 1);

    let other = ScriptedConnection {
        probe: "SunOS sparc64\n".to_string(),
        uploads,
    };
    assert!(matches!(
        installer.ensure(&other).await.unwrap_err(),
        DeployError::AgentMissing { .. }
    ));
}
