//! Tree runner - reconciles a destination directory with an asset tree

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::assets::{dir_to_asset, Asset, AssetError, AssetFile, AssetTree};
use crate::playbook::{Task, Vars, ASSETS_ARG};
use crate::runners::{
    error::RunnerError,
    files::prefix::PrefixMetaMap,
    files::utils::{
        atomic_write, ensure_mode, ensure_ownership, same_content, set_mode, FileError,
    },
    interface::{RunContext, Runner, RunnerSpec},
    template_engine::TemplateEngine,
};
use crate::runtime::TaskResult;

pub const DEFAULT_UMASK: u32 = 0o022;
pub const DEFAULT_DIR_MODE: u32 = 0o777;
pub const DEFAULT_FILE_MODE: u32 = 0o666;

/// Bytes inspected by [`is_text`]
const TEXT_SAMPLE: usize = 8000;

/// Makes `dst` match the asset loaded from `src`: creates missing entries,
/// rewrites files whose content differs and corrects mode and ownership.
/// Text files are rendered as templates first.
pub struct TreeRunner;

#[async_trait]
impl Runner for TreeRunner {
    fn name(&self) -> &'static str {
        "tree"
    }

    fn spec(&self) -> RunnerSpec {
        RunnerSpec {
            required_args: &["src"],
            optional_args: &["dst"],
            pre_run: true,
            ..Default::default()
        }
    }

    async fn pre_run(
        &self,
        task: &mut Task,
        ctx: &RunContext<'_>,
    ) -> Result<TaskResult, RunnerError> {
        let src = task
            .arg_str("src")
            .ok_or_else(|| RunnerError::missing(self.name(), "src"))?;
        let root = ctx.base_dir.join(src);

        let asset = dir_to_asset(&root, ctx.vault)?;
        let count = asset.files.len();
        info!("Loaded {} entries for tree {}", count, root.display());

        task.args
            .insert(ASSETS_ARG.to_string(), serde_json::to_value(&asset)?);
        Ok(TaskResult::success(format!("loaded {count} entries from {}\n", root.display())))
    }

    async fn run(&self, task: &mut Task, ctx: &RunContext<'_>) -> Result<TaskResult, RunnerError> {
        let asset: Asset = match task.args.remove(ASSETS_ARG) {
            Some(value) => serde_json::from_value(value).map_err(AssetError::from)?,
            None => {
                return Err(AssetError::NotLoaded {
                    name: task.arg_str("src").unwrap_or_default().to_string(),
                }
                .into())
            }
        };

        let dst = resolve_dst(task.arg_str("dst"))?;
        if tokio::fs::metadata(&dst).await.is_err() {
            return Err(RunnerError::DestinationMissing {
                path: dst.display().to_string(),
            });
        }

        let prefixes = PrefixMetaMap::from_args(&task.args)?;
        let reconciler = Reconciler {
            dst: &dst,
            prefixes: &prefixes,
            templates: ctx.templates,
            vars: ctx.vars,
        };
        reconciler.apply(&asset).await
    }
}

struct Reconciler<'a> {
    dst: &'a Path,
    prefixes: &'a PrefixMetaMap,
    templates: &'a TemplateEngine,
    vars: &'a Vars,
}

impl Reconciler<'_> {
    async fn apply(&self, asset: &Asset) -> Result<TaskResult, RunnerError> {
        let mut output = String::new();
        let mut changed_any = false;
        let mut notify = BTreeSet::new();

        for entry in AssetTree::new(asset).iter() {
            let tree_path = format!("/{}", entry.path.display());
            let dst_path = self.dst.join(entry.path);
            let meta = self.prefixes.resolve(&tree_path);
            let umask = meta.umask.unwrap_or(DEFAULT_UMASK);

            let changed = match entry.file.filter(|f| !f.is_dir()) {
                None => ensure_dir(&dst_path, DEFAULT_DIR_MODE & !umask, meta.uid, meta.gid).await?,
                Some(file) => {
                    let data = self.render(file)?;
                    let mode = file_mode(file) & !umask;
                    ensure_file(&dst_path, &data, mode, meta.uid, meta.gid).await?
                }
            };

            if changed {
                changed_any = true;
                notify.extend(meta.notify);
            }
            let status = if changed { "changed" } else { "ok" };
            let _ = writeln!(output, "{:<7} {}", status, dst_path.display());
        }

        let mut result = TaskResult::success(output).changed(changed_any);
        result.notify = notify;
        Ok(result)
    }

    fn render(&self, file: &AssetFile) -> Result<Vec<u8>, RunnerError> {
        if !is_text(&file.data) {
            return Ok(file.data.clone());
        }
        self.templates
            .render_bytes(&file.data, self.vars)
            .map_err(|e| RunnerError::InvalidArgument {
                arg: file.path.clone(),
                reason: e.to_string(),
            })
    }
}

/// Asset permission bits, falling back to the default file mode
fn file_mode(file: &AssetFile) -> u32 {
    match file.perm() & 0o777 {
        0 => DEFAULT_FILE_MODE,
        mode => mode,
    }
}

/// Empty means the home directory, relative paths are joined under it
pub fn resolve_dst(dst: Option<&str>) -> Result<PathBuf, RunnerError> {
    let dst = dst.unwrap_or_default();
    if dst.starts_with('/') {
        return Ok(PathBuf::from(dst));
    }

    let home = dirs::home_dir().ok_or_else(|| RunnerError::InvalidArgument {
        arg: "dst".to_string(),
        reason: "cannot determine home directory".to_string(),
    })?;
    if dst.is_empty() {
        Ok(home)
    } else {
        Ok(home.join(dst))
    }
}

/// Valid UTF-8 without control characters (other than common whitespace
/// and escape) in the leading sample
pub fn is_text(data: &[u8]) -> bool {
    if std::str::from_utf8(data).is_err() {
        return false;
    }
    data.iter()
        .take(TEXT_SAMPLE)
        .all(|&b| b >= 0x20 || matches!(b, b'\t' | b'\n' | b'\r' | 0x0c | 0x1b))
}

fn file_err<'a>(
    operation: &'static str,
    path: &'a Path,
) -> impl FnOnce(FileError) -> RunnerError + 'a {
    move |err| match err {
        FileError::Io { source } => RunnerError::io(operation, path, source),
        other => RunnerError::File(other),
    }
}

async fn ensure_dir(
    path: &Path,
    mode: u32,
    uid: Option<u32>,
    gid: Option<u32>,
) -> Result<bool, RunnerError> {
    let mut changed = false;

    match tokio::fs::metadata(path).await {
        Ok(metadata) if !metadata.is_dir() => {
            return Err(RunnerError::PathConflict {
                path: path.display().to_string(),
                expected: "directory".to_string(),
            })
        }
        Ok(_) => {
            if ensure_mode(path, mode).await.map_err(file_err("chmod", path))? {
                debug!("Changed mode of {} to {:o}", path.display(), mode);
                changed = true;
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tokio::fs::create_dir(path)
                .await
                .map_err(|e| RunnerError::io("mkdir", path, e))?;
            set_mode(path, mode).await.map_err(file_err("chmod", path))?;
            changed = true;
        }
        Err(e) => return Err(RunnerError::io("stat", path, e)),
    }

    if ensure_ownership(path, uid, gid)
        .await
        .map_err(file_err("chown", path))?
    {
        changed = true;
    }
    Ok(changed)
}

async fn ensure_file(
    path: &Path,
    data: &[u8],
    mode: u32,
    uid: Option<u32>,
    gid: Option<u32>,
) -> Result<bool, RunnerError> {
    let previous = match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => {
            return Err(RunnerError::PathConflict {
                path: path.display().to_string(),
                expected: "file".to_string(),
            })
        }
        Ok(metadata) => Some(owner_ids(&metadata)),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => return Err(RunnerError::io("stat", path, e)),
    };
    let exists = previous.is_some();

    let needs_write = !exists
        || !same_content(path, data)
            .await
            .map_err(file_err("checksum", path))?;

    let mut changed = false;
    if needs_write {
        debug!("Writing {} ({} bytes)", path.display(), data.len());
        atomic_write(path, data, mode)
            .await
            .map_err(file_err("write", path))?;
        changed = true;
    } else if ensure_mode(path, mode).await.map_err(file_err("chmod", path))? {
        changed = true;
    }

    // a replaced file is a new inode; it keeps the old owner unless overridden
    let (old_uid, old_gid) = previous.unwrap_or_default();
    if ensure_ownership(path, uid.or(old_uid), gid.or(old_gid))
        .await
        .map_err(file_err("chown", path))?
    {
        changed = true;
    }
    Ok(changed)
}

#[cfg(unix)]
fn owner_ids(metadata: &std::fs::Metadata) -> (Option<u32>, Option<u32>) {
    use std::os::unix::fs::MetadataExt;
    (Some(metadata.uid()), Some(metadata.gid()))
}

#[cfg(not(unix))]
fn owner_ids(_metadata: &std::fs::Metadata) -> (Option<u32>, Option<u32>) {
    (None, None)
}
