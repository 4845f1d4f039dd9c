//! Job assembly, transports, agent installation and per-host orchestration

pub mod assembler;
pub mod error;
pub mod installer;
pub mod local;
pub mod orchestrator;
pub mod platform;
pub mod ssh;
pub mod transport;

pub use assembler::assemble_jobs;
pub use error::{DeployError, TransportError};
pub use installer::{AgentInstaller, RemoteAgentState};
pub use local::LocalTransport;
pub use orchestrator::{Orchestrator, OrchestratorSettings, AGENT_RUNNER};
pub use platform::Platform;
pub use ssh::{SshSettings, SshTransport};
pub use transport::{CommandOutput, Connection, ExitReport, HostSpec, RemoteProcess, Transport};
