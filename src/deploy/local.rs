//! In-process transport: jobs run through the agent executor inside the
//! controller, connected by in-memory pipes instead of ssh

use async_trait::async_trait;
use futures::FutureExt;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

use super::error::TransportError;
use super::transport::{CommandOutput, Connection, ExitReport, HostSpec, RemoteProcess, Transport};
use crate::protocol::{spawn_frame_reader, Compression, RecordWriter};
use crate::runners::files::utils::atomic_write;
use crate::runners::RunnerRegistry;
use crate::runtime::{AgentExecutor, Dispatcher};

const PIPE_CAPACITY: usize = 64 * 1024;

pub struct LocalTransport {
    registry: Arc<RunnerRegistry>,
    compression: Compression,
}

impl LocalTransport {
    pub fn new(registry: Arc<RunnerRegistry>, compression: Compression) -> Self {
        Self {
            registry,
            compression,
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn connect(&self, host: &HostSpec) -> Result<Box<dyn Connection>, TransportError> {
        Ok(Box::new(LocalConnection {
            label: host.to_string(),
            registry: Arc::clone(&self.registry),
            compression: self.compression,
        }))
    }

    fn requires_agent_install(&self) -> bool {
        false
    }
}

pub struct LocalConnection {
    label: String,
    registry: Arc<RunnerRegistry>,
    compression: Compression,
}

#[async_trait]
impl Connection for LocalConnection {
    fn host(&self) -> &str {
        &self.label
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, TransportError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|source| TransportError::Spawn {
                program: "sh".to_string(),
                source,
            })?;
        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn upload_bytes(
        &self,
        data: &[u8],
        remote_path: &str,
        mode: u32,
    ) -> Result<(), TransportError> {
        let mut path = PathBuf::from(remote_path);
        if path.is_relative() {
            if let Some(home) = dirs::home_dir() {
                path = home.join(path);
            }
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        atomic_write(&path, data, mode)
            .await
            .map_err(|e| TransportError::Upload {
                host: self.label.clone(),
                path: remote_path.to_string(),
                reason: e.to_string(),
            })
    }

    /// The command line is only logged; the job is handed to an in-process
    /// executor and its result stream comes back through a duplex pipe
    async fn stream_exec(
        &self,
        command: &str,
        stdin: Vec<u8>,
    ) -> Result<RemoteProcess, TransportError> {
        debug!("Running job for {} in-process (would run: {})", self.label, command);
        let frames = spawn_frame_reader(Cursor::new(stdin), self.compression);
        let (agent_end, controller_end) = tokio::io::duplex(PIPE_CAPACITY);
        let executor = AgentExecutor::new(Dispatcher::new(Arc::clone(&self.registry)));

        let handle = tokio::spawn(async move {
            let mut writer = RecordWriter::new(agent_end);
            executor.execute(frames, &mut writer).await
        });

        let completion = async move {
            let report = match handle.await {
                Ok(Ok(_summary)) => ExitReport {
                    success: true,
                    status: "exit status: 0".to_string(),
                    stderr: String::new(),
                },
                Ok(Err(e)) => ExitReport {
                    success: false,
                    status: "exit status: 1".to_string(),
                    stderr: e.to_string(),
                },
                Err(e) => ExitReport {
                    success: false,
                    status: "aborted".to_string(),
                    stderr: e.to_string(),
                },
            };
            Ok(report)
        }
        .boxed();

        Ok(RemoteProcess {
            stdout: Box::pin(controller_end),
            completion,
        })
    }
}
