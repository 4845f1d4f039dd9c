use std::fmt;

use super::error::DeployError;

/// Operating system and CPU architecture of a host, normalized so that the
/// same machine reports the same pair whichever tool is asked
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: &str, arch: &str) -> Self {
        Self {
            os: os.to_lowercase(),
            arch: normalize_arch(arch),
        }
    }

    /// Parse the output of `uname -sm`, e.g. `Linux x86_64`
    pub fn from_uname(output: &str) -> Result<Self, DeployError> {
        let mut words = output.split_whitespace();
        match (words.next(), words.next()) {
            (Some(os), Some(arch)) => Ok(Self::new(os, arch)),
            _ => Err(DeployError::UnknownPlatform {
                output: output.trim().to_string(),
            }),
        }
    }

    /// Platform the controller itself runs on
    pub fn current() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn agent_file_name(&self) -> String {
        format!("rustle-agent-{}-{}", self.os, self.arch)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

fn normalize_arch(arch: &str) -> String {
    match arch.to_lowercase().as_str() {
        "x86_64" | "amd64" => "x86_64".to_string(),
        "aarch64" | "arm64" => "aarch64".to_string(),
        other => other.to_string(),
    }
}
