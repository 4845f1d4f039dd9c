//! Fans a set of per-host jobs out over a transport and merges the streamed
//! results into one channel

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::error::DeployError;
use super::installer::AgentInstaller;
use super::transport::{HostSpec, Transport};
use crate::playbook::Task;
use crate::protocol::{encode_job, Compression, Job, RecordReader};
use crate::runtime::TaskResult;

const RESULT_BUFFER: usize = 64;

/// Runner name carried by synthetic results for host-level failures
pub const AGENT_RUNNER: &str = "agent";

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub remote_path: String,
    pub sudo: bool,
    pub compression: Compression,
    /// Number of `-v` flags passed on to the agent
    pub agent_verbosity: u8,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            remote_path: ".cache/rustle/agent".to_string(),
            sudo: true,
            compression: Compression::default(),
            agent_verbosity: 0,
        }
    }
}

impl OrchestratorSettings {
    /// Remote command line that starts the agent
    pub fn agent_command(&self) -> String {
        let mut command = String::new();
        if self.sudo {
            command.push_str("sudo ");
        }
        command.push_str(&shell_words::quote(&self.remote_path));
        command.push_str(&format!(" --compression {}", self.compression));
        if self.agent_verbosity > 0 {
            command.push_str(&format!(" -{}", "v".repeat(self.agent_verbosity as usize)));
        }
        command
    }
}

pub struct Orchestrator {
    transport: Arc<dyn Transport>,
    installer: Option<Arc<AgentInstaller>>,
    settings: Arc<OrchestratorSettings>,
}

impl Orchestrator {
    pub fn new(transport: Arc<dyn Transport>, settings: OrchestratorSettings) -> Self {
        Self {
            transport,
            installer: None,
            settings: Arc::new(settings),
        }
    }

    pub fn with_installer(mut self, installer: AgentInstaller) -> Self {
        self.installer = Some(Arc::new(installer));
        self
    }

    /// Start one unit per host and return the shared result channel. The
    /// channel closes once every host unit has finished.
    pub fn launch(&self, jobs: BTreeMap<String, Job>) -> mpsc::Receiver<TaskResult> {
        let (tx, rx) = mpsc::channel(RESULT_BUFFER);
        let mut units = JoinSet::new();

        for (host, job) in jobs {
            let unit = HostUnit {
                host,
                transport: Arc::clone(&self.transport),
                installer: self.installer.clone(),
                settings: Arc::clone(&self.settings),
            };
            let tx = tx.clone();
            units.spawn(unit.run(job, tx));
        }
        drop(tx);

        tokio::spawn(async move {
            while let Some(joined) = units.join_next().await {
                if let Err(e) = joined {
                    error!("Host unit panicked: {}", e);
                }
            }
            debug!("All host units finished");
        });

        rx
    }
}

struct HostUnit {
    host: String,
    transport: Arc<dyn Transport>,
    installer: Option<Arc<AgentInstaller>>,
    settings: Arc<OrchestratorSettings>,
}

impl HostUnit {
    async fn run(self, job: Job, tx: mpsc::Sender<TaskResult>) {
        let started = Instant::now();
        if let Err(e) = self.converge(job, &tx).await {
            error!("Host {} failed: {}", self.host, e);
            let mut result = TaskResult::failed(format!("{e}\n"))
                .with_task(Task::new(AGENT_RUNNER).with_name(self.host.clone()));
            result.host = self.host.clone();
            result.duration = started.elapsed();
            let _ = tx.send(result).await;
        }
    }

    async fn converge(&self, job: Job, tx: &mpsc::Sender<TaskResult>) -> Result<(), DeployError> {
        let spec: HostSpec = self.host.parse()?;
        let connection = self.transport.connect(&spec).await?;

        if self.transport.requires_agent_install() {
            if let Some(installer) = &self.installer {
                installer.ensure(connection.as_ref()).await?;
            }
        }

        let payload = encode_job(&job, self.settings.compression)?;
        let command = self.settings.agent_command();
        info!(
            "Starting agent on {}: {} plays, {} bytes",
            self.host,
            job.plays.len(),
            payload.len()
        );
        let process = connection.stream_exec(&command, payload).await?;

        let mut reader = RecordReader::new(BufReader::new(process.stdout));
        let mut received = 0usize;
        let stream_result = loop {
            match reader.next_record::<TaskResult>().await {
                Ok(Some(mut result)) => {
                    result.host = self.host.clone();
                    received += 1;
                    if tx.send(result).await.is_err() {
                        break Err(DeployError::Aborted {
                            host: self.host.clone(),
                            reason: "result channel closed".to_string(),
                        });
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(DeployError::from(e)),
            }
        };
        // an agent still writing must see a closed pipe, not block forever
        drop(reader);

        let exit = process.completion.await?;
        if let Err(e) = connection.close().await {
            debug!("Closing connection to {} failed: {}", self.host, e);
        }
        stream_result?;

        if !exit.success {
            return Err(DeployError::AgentExit {
                host: self.host.clone(),
                status: exit.status,
                stderr: exit.stderr.trim().to_string(),
            });
        }
        debug!("Host {} streamed {} results", self.host, received);
        Ok(())
    }
}
