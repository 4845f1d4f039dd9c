//! Shared fixtures for integration tests

#![allow(dead_code)]

use rustle_converge::playbook::{Task, POSITIONAL_ARG};
use rustle_converge::runners::RunnerRegistry;
use rustle_converge::runtime::Dispatcher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Temporary directory with helpers for laying out source trees
pub struct TestEnvironment {
    dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn create_dir(&self, rel: &str) -> PathBuf {
        let path = self.join(rel);
        std::fs::create_dir_all(&path).expect("create dir");
        path
    }

    pub fn create_file(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(&path, content).expect("write file");
        path
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.join(rel)).expect("read file")
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(Arc::new(RunnerRegistry::with_core_runners())).with_base_dir(self.path())
    }
}

pub fn shell(script: &str) -> Task {
    Task::new("shell").with_arg(POSITIONAL_ARG, script)
}

#[cfg(unix)]
pub fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).expect("stat").permissions().mode() & 0o7777
}
