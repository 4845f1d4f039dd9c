//! Rustle Converge - push-based configuration management
//!
//! A controller compiles a playbook, slices it into per-host jobs and streams
//! each job to a small agent on the host. The agent converges the host task
//! by task and streams results back as they happen.

pub mod assets;
pub mod cli;
pub mod config;
pub mod deploy;
pub mod playbook;
pub mod protocol;
pub mod report;
pub mod runners;
pub mod runtime;

pub use config::ControllerConfig;
pub use deploy::{assemble_jobs, Orchestrator};
pub use playbook::{Play, Playbook, PlaybookCompiler, Task};
pub use runners::RunnerRegistry;
pub use runtime::{TaskResult, TaskStatus};
