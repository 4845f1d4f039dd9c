//! Task dispatch, agent-side job execution and task results

pub mod dispatch;
pub mod error;
pub mod executor;
pub mod prepare;
pub mod state;

pub use dispatch::{merge_vars, validate_args, Dispatcher};
pub use error::ExecutionError;
pub use executor::{AgentExecutor, ExecutionSummary};
pub use prepare::prepare_playbook;
pub use state::{TaskResult, TaskStatus};
