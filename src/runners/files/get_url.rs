//! get_url runner - downloads a file to a destination path

use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::playbook::Task;
use crate::runners::{
    error::RunnerError,
    files::utils::{
        atomic_write, ensure_mode, get_mode, parse_mode, same_content, sha256_hex,
    },
    interface::{RunContext, Runner, RunnerSpec},
};
use crate::runtime::TaskResult;

const DEFAULT_MODE: u32 = 0o644;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Downloads `url` to `dest`. Reports a change only when the downloaded
/// content differs from what is already there.
pub struct GetUrlRunner {
    client: Client,
}

impl GetUrlRunner {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, RunnerError> {
        let http_err = |source| RunnerError::Http {
            url: url.to_string(),
            source,
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(http_err)?;
        let body = response.bytes().await.map_err(http_err)?;
        Ok(body.to_vec())
    }
}

impl Default for GetUrlRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Runner for GetUrlRunner {
    fn name(&self) -> &'static str {
        "get_url"
    }

    fn spec(&self) -> RunnerSpec {
        RunnerSpec {
            required_args: &["url", "dest"],
            optional_args: &["mode", "checksum"],
            ..Default::default()
        }
    }

    async fn run(&self, task: &mut Task, _ctx: &RunContext<'_>) -> Result<TaskResult, RunnerError> {
        let url = task
            .arg_str("url")
            .ok_or_else(|| RunnerError::missing(self.name(), "url"))?;
        let dest = Path::new(
            task.arg_str("dest")
                .ok_or_else(|| RunnerError::missing(self.name(), "dest"))?,
        );

        info!("Downloading {} to {}", url, dest.display());
        let data = self.fetch(url).await?;

        if let Some(expected) = task.arg_str("checksum") {
            verify_checksum(expected, &data)?;
        }

        let exists = dest.exists();
        let mode = match task.arg_str("mode") {
            Some(mode) => parse_mode(mode)?,
            None if exists => get_mode(dest).await?,
            None => DEFAULT_MODE,
        };

        if exists && same_content(dest, &data).await? {
            debug!("{} is up to date", dest.display());
            let mode_changed = ensure_mode(dest, mode).await?;
            return Ok(TaskResult::success("").changed(mode_changed));
        }

        atomic_write(dest, &data, mode).await?;
        Ok(TaskResult::success(format!("{} bytes written to {}\n", data.len(), dest.display()))
            .changed(true))
    }
}

/// `expected` is `sha256:<hex>` or a bare hex digest
fn verify_checksum(expected: &str, data: &[u8]) -> Result<(), RunnerError> {
    let digest = expected.strip_prefix("sha256:").unwrap_or(expected);
    let actual = sha256_hex(data);
    if !digest.eq_ignore_ascii_case(&actual) {
        return Err(RunnerError::InvalidArgument {
            arg: "checksum".to_string(),
            reason: format!("expected {digest}, downloaded content has {actual}"),
        });
    }
    Ok(())
}
