//! Controller command line

pub mod commands;
pub mod options;
pub mod setup;

pub use commands::{apply_overrides, load_playbook, run_converge};
pub use options::{parse_extra_var, ConvergeCli};
pub use setup::{init_agent_tracing, init_tracing, level_for};
