//! Core runners: commands, packages, services and diagnostics

pub mod command;
pub mod debug;
pub mod local_action;
pub mod package;
pub mod service;

pub use command::{CommandRunner, ShellRunner};
pub use debug::DebugRunner;
pub use local_action::LocalActionRunner;
pub use package::AptRunner;
pub use service::ServiceRunner;
