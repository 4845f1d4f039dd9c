//! Whole-file replacement through a sibling staging file and a rename

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::FileError;

/// Staging file living next to its destination. Content becomes visible
/// only through [`StagedFile::persist`]; until then the destination keeps
/// its previous content. Dropping an unpersisted stage deletes it.
pub struct StagedFile {
    stage: PathBuf,
    destination: PathBuf,
    handle: Option<tokio::fs::File>,
}

impl StagedFile {
    pub async fn create(destination: &Path) -> Result<Self, FileError> {
        let stage = stage_path(destination)?;
        let handle = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&stage)
            .await?;

        Ok(Self {
            stage,
            destination: destination.to_path_buf(),
            handle: Some(handle),
        })
    }

    pub fn stage_path(&self) -> &Path {
        &self.stage
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<(), FileError> {
        let handle = self.handle.as_mut().ok_or_else(|| FileError::InvalidPath {
            path: self.stage.display().to_string(),
        })?;
        handle.write_all(data).await?;
        Ok(())
    }

    /// Sync the stage to disk, give it `mode` and rename it over the
    /// destination
    pub async fn persist(mut self, mode: Option<u32>) -> Result<(), FileError> {
        if let Some(mut handle) = self.handle.take() {
            handle.flush().await?;
            handle.sync_all().await?;
        }
        if let Some(mode) = mode {
            super::set_mode(&self.stage, mode).await?;
        }
        tokio::fs::rename(&self.stage, &self.destination).await?;
        // renamed away, nothing left for Drop to clean up
        self.stage.clear();
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        self.handle.take();
        if !self.stage.as_os_str().is_empty() {
            let _ = std::fs::remove_file(&self.stage);
        }
    }
}

/// `.<name>.<uuid>.stage` in the destination's directory
fn stage_path(destination: &Path) -> Result<PathBuf, FileError> {
    let name = destination
        .file_name()
        .ok_or_else(|| FileError::InvalidPath {
            path: destination.display().to_string(),
        })?
        .to_string_lossy();
    let dir = destination.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join(format!(".{}.{}.stage", name, uuid::Uuid::new_v4().simple())))
}

/// Replace `path` with `data` so that no reader ever sees a partial file,
/// leaving it with permission bits `mode`
pub async fn atomic_write(path: &Path, data: &[u8], mode: u32) -> Result<(), FileError> {
    let mut staged = StagedFile::create(path).await?;
    staged.write(data).await?;
    staged.persist(Some(mode)).await
}
