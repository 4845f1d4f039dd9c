//! Transport over the system `ssh` and `scp` clients

use async_trait::async_trait;
use futures::FutureExt;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::error::TransportError;
use super::transport::{CommandOutput, Connection, ExitReport, HostSpec, RemoteProcess, Transport};

#[derive(Debug, Clone)]
pub struct SshSettings {
    pub binary: String,
    pub scp_binary: String,
    pub connect_timeout: u64,
    /// Extra `-o` options, e.g. `StrictHostKeyChecking=accept-new`
    pub options: Vec<String>,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            binary: "ssh".to_string(),
            scp_binary: "scp".to_string(),
            connect_timeout: 10,
            options: Vec::new(),
        }
    }
}

pub struct SshTransport {
    settings: SshSettings,
}

impl SshTransport {
    pub fn new(settings: SshSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn connect(&self, host: &HostSpec) -> Result<Box<dyn Connection>, TransportError> {
        let connection = SshConnection {
            spec: host.clone(),
            label: host.to_string(),
            settings: self.settings.clone(),
        };

        let probe = connection.run("true").await.map_err(|e| TransportError::Connect {
            host: connection.label.clone(),
            reason: e.to_string(),
        })?;
        if !probe.success {
            return Err(TransportError::Connect {
                host: connection.label.clone(),
                reason: probe.stderr.trim().to_string(),
            });
        }

        debug!("Connected to {}", connection.label);
        Ok(Box::new(connection))
    }
}

pub struct SshConnection {
    spec: HostSpec,
    label: String,
    settings: SshSettings,
}

impl SshConnection {
    fn common_options(&self, cmd: &mut Command) {
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.settings.connect_timeout));
        for option in &self.settings.options {
            cmd.arg("-o").arg(option);
        }
    }

    fn ssh(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.settings.binary);
        self.common_options(&mut cmd);
        if let Some(port) = self.spec.port {
            cmd.arg("-p").arg(port.to_string());
        }
        if let Some(user) = &self.spec.user {
            cmd.arg("-l").arg(user);
        }
        cmd.arg(&self.spec.host).arg(command);
        cmd
    }

    fn scp_target(&self, remote_path: &str) -> String {
        match &self.spec.user {
            Some(user) => format!("{}@{}:{}", user, self.spec.host, remote_path),
            None => format!("{}:{}", self.spec.host, remote_path),
        }
    }

    fn spawn_err(&self, program: &str) -> impl FnOnce(std::io::Error) -> TransportError {
        let program = program.to_string();
        move |source| TransportError::Spawn { program, source }
    }
}

#[async_trait]
impl Connection for SshConnection {
    fn host(&self) -> &str {
        &self.label
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, TransportError> {
        debug!("Executing command on {}: {}", self.label, command);
        let output = self
            .ssh(command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(self.spawn_err(&self.settings.binary))?;

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
        let upload_err = |reason: String| TransportError::Upload {
            host: self.label.clone(),
            path: remote_path.to_string(),
            reason,
        };

        let temp_file = tempfile::NamedTempFile::new()?;
        tokio::fs::write(temp_file.path(), data).await?;

        let staging = format!("{}.{}.tmp", remote_path, uuid::Uuid::new_v4().simple());
        let parent = match remote_path.rsplit_once('/') {
            Some((dir, _)) if !dir.is_empty() => dir,
            _ => ".",
        };
        let prepare = self.run(&format!("mkdir -p {}", shell_words::quote(parent))).await?;
        if !prepare.success {
            return Err(upload_err(prepare.stderr.trim().to_string()));
        }

        let mut cmd = Command::new(&self.settings.scp_binary);
        self.common_options(&mut cmd);
        if let Some(port) = self.spec.port {
            cmd.arg("-P").arg(port.to_string());
        }
        cmd.arg("-q").arg(temp_file.path()).arg(self.scp_target(&staging));

        let output = cmd
            .output()
            .await
            .map_err(self.spawn_err(&self.settings.scp_binary))?;
        if !output.status.success() {
            return Err(upload_err(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let install = format!(
            "chmod {:o} {staging} && mv -f {staging} {target}",
            mode,
            staging = shell_words::quote(&staging),
            target = shell_words::quote(remote_path),
        );
        let result = self.run(&install).await?;
        if !result.success {
            return Err(upload_err(result.stderr.trim().to_string()));
        }
        Ok(())
    }

    async fn stream_exec(
        &self,
        command: &str,
        stdin: Vec<u8>,
    ) -> Result<RemoteProcess, TransportError> {
        debug!("Streaming command on {}: {}", self.label, command);
        let mut child = self
            .ssh(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(self.spawn_err(&self.settings.binary))?;

        let (Some(mut child_stdin), Some(stdout), Some(mut stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(TransportError::Connect {
                host: self.label.clone(),
                reason: "ssh process has no stdio pipes".to_string(),
            });
        };

        let label = self.label.clone();
        let feeder = tokio::spawn(async move {
            if let Err(e) = child_stdin.write_all(&stdin).await {
                warn!("Writing job to {} failed: {}", label, e);
            }
            // dropping stdin closes the pipe so the agent sees EOF
        });
        let stderr_reader = tokio::spawn(async move {
            let mut buffer = String::new();
            let _ = stderr.read_to_string(&mut buffer).await;
            buffer
        });

        let completion = async move {
            let status = child.wait().await?;
            let _ = feeder.await;
            let stderr = stderr_reader.await.unwrap_or_default();
            Ok(ExitReport {
                success: status.success(),
                status: status.to_string(),
                stderr,
            })
        }
        .boxed();

        Ok(RemoteProcess {
            stdout: Box::pin(stdout),
            completion,
        })
    }
}
