use clap::Parser;
use std::path::PathBuf;

use crate::playbook::Vars;
use crate::protocol::Compression;

/// Converge hosts to the state declared in a playbook
#[derive(Parser, Debug, Clone)]
#[command(name = "rustle-converge")]
#[command(about = "Push a playbook to hosts and converge them with a remote agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct ConvergeCli {
    /// Playbook file
    pub playbook: PathBuf,

    /// Increase verbosity; once for line-per-task output, more for debug logs
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only run tasks carrying one of these tags
    #[arg(short, long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Only converge these hosts
    #[arg(short, long, value_delimiter = ',')]
    pub limit: Vec<String>,

    /// Extra job variable, `key=value`; the value is read as YAML
    #[arg(short = 'e', long = "extra-var", value_parser = parse_extra_var)]
    pub extra_vars: Vec<(String, serde_json::Value)>,

    /// Controller config file (default: rustle.yml next to the playbook)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Compression of the job stream sent to agents
    #[arg(long)]
    pub compression: Option<Compression>,

    /// Directory holding per-platform agent binaries
    #[arg(long)]
    pub agent_dir: Option<PathBuf>,

    /// Skip the agent hash check and upload
    #[arg(long)]
    pub no_install: bool,

    /// Run the agent without sudo
    #[arg(long)]
    pub no_sudo: bool,

    /// Run every job in-process against the local machine instead of over ssh
    #[arg(long)]
    pub local: bool,

    /// Compile and prepare the playbook, print the per-host jobs and stop
    #[arg(long)]
    pub dry_run: bool,
}

impl ConvergeCli {
    pub fn job_vars(&self) -> Vars {
        self.extra_vars.iter().cloned().collect()
    }
}

/// `key=value` with the value parsed as a YAML scalar or collection
pub fn parse_extra_var(input: &str) -> Result<(String, serde_json::Value), String> {
    let (key, raw) = input
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{input}'"))?;
    if key.is_empty() {
        return Err(format!("empty variable name in '{input}'"));
    }
    let value = serde_yaml::from_str::<serde_json::Value>(raw)
        .ok()
        .filter(|v| !v.is_null() || raw.trim() == "null")
        .unwrap_or_else(|| serde_json::Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_extra_var() {
        assert_eq!(parse_extra_var("port=8080").unwrap(), ("port".to_string(), json!(8080)));
        assert_eq!(
            parse_extra_var("motd=hello world").unwrap(),
            ("motd".to_string(), json!("hello world"))
        );
        assert_eq!(parse_extra_var("empty=").unwrap().1, json!(""));
        assert!(parse_extra_var("novalue").is_err());
        assert!(parse_extra_var("=x").is_err());
    }

    #[test]
    fn test_cli_flags() {
        let cli = ConvergeCli::try_parse_from([
            "rustle-converge",
            "site.yml",
            "-vv",
            "--tags",
            "web,db",
            "-e",
            "env=prod",
            "--compression",
            "none",
            "--local",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.tags, vec!["web", "db"]);
        assert_eq!(cli.compression, Some(Compression::None));
        assert_eq!(cli.job_vars()["env"], "prod");
        assert!(cli.local && !cli.no_install);
    }
}
