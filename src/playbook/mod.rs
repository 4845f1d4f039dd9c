//! Playbook data model and compiler

pub mod args;
pub mod compiler;
pub mod error;
pub mod types;

pub use args::{format_arg_string, parse_arg_string, split_list};
pub use compiler::{expand_loops, Compilation, PlaybookCompiler};
pub use error::CompileError;
pub use types::{Play, Playbook, Task, TaskArgs, Vars, ASSETS_ARG, POSITIONAL_ARG};
