//! Directory to asset conversion

use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use super::asset::{Asset, AssetFile, S_IFDIR};
use super::error::AssetError;
use super::vault::Vault;

/// Baseline permissions for every entry. Version control only keeps the
/// executable bit, so everything starts wide open and the umask narrows it.
const DEFAULT_PERMISSION: u32 = 0o666;

/// Load every file and directory below `root` into an asset. File content is
/// read through the vault so encrypted files ship decrypted.
pub fn dir_to_asset(root: &Path, vault: &Vault) -> Result<Asset, AssetError> {
    if !root.is_dir() {
        return Err(AssetError::NotADirectory {
            path: root.display().to_string(),
        });
    }

    let mut asset = Asset {
        name: root.display().to_string(),
        files: Vec::new(),
    };

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|source| AssetError::Walk {
            path: root.display().to_string(),
            source,
        })?;
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let metadata = entry.metadata().map_err(|source| AssetError::Walk {
            path: entry.path().display().to_string(),
            source,
        })?;

        if metadata.is_dir() {
            asset.files.push(AssetFile {
                path: relative,
                data: Vec::new(),
                mode: S_IFDIR | normalize_mode(source_mode(&metadata)),
            });
        } else {
            let data = vault.open(entry.path())?;
            asset.files.push(AssetFile {
                path: relative,
                data,
                mode: normalize_mode(source_mode(&metadata)),
            });
        }
    }

    debug!("Loaded asset {} with {} entries", asset.name, asset.files.len());
    Ok(asset)
}

/// Widen to rw for everyone; an owner executable bit becomes executable for all
pub fn normalize_mode(mode: u32) -> u32 {
    let mut mode = (mode & 0o777) | DEFAULT_PERMISSION;
    if mode & 0o100 != 0 {
        mode |= 0o111;
    }
    mode
}

#[cfg(unix)]
fn source_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn source_mode(metadata: &std::fs::Metadata) -> u32 {
    if metadata.is_dir() {
        0o755
    } else {
        0o644
    }
}
