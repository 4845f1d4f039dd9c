//! Runners: the pluggable executors behind every task

pub mod core;
pub mod error;
pub mod files;
pub mod interface;
pub mod registry;
pub mod template_engine;

pub use error::RunnerError;
pub use interface::{RunContext, Runner, RunnerSpec};
pub use registry::RunnerRegistry;
pub use template_engine::{TemplateEngine, TemplateError};
