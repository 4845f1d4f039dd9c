use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Directory flag inside [`AssetFile::mode`], same bit as `S_IFDIR`
pub const S_IFDIR: u32 = 0o040000;

/// A named virtual file tree shipped inside a task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub files: Vec<AssetFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetFile {
    /// Path relative to the asset root, `/` separated, no leading slash
    pub path: String,
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<u8>,
    pub mode: u32,
}

impl AssetFile {
    pub fn file(path: impl Into<String>, data: impl Into<Vec<u8>>, mode: u32) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
            mode: mode & !S_IFDIR,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            data: Vec::new(),
            mode: S_IFDIR | 0o777,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFDIR != 0
    }

    /// Permission bits without the directory flag
    pub fn perm(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// One entry of an [`AssetTree`]
#[derive(Debug, Clone, Copy)]
pub struct TreeEntry<'a> {
    pub path: &'a Path,
    /// `None` for directories
    pub file: Option<&'a AssetFile>,
}

impl TreeEntry<'_> {
    pub fn is_dir(&self) -> bool {
        self.file.map_or(true, AssetFile::is_dir)
    }
}

/// Sorted view over an asset. Parents always precede their children, and
/// directories implied by a file path are present even when the asset does
/// not list them.
pub struct AssetTree<'a> {
    entries: BTreeMap<PathBuf, Option<&'a AssetFile>>,
}

impl<'a> AssetTree<'a> {
    pub fn new(asset: &'a Asset) -> Self {
        let mut entries = BTreeMap::new();
        for file in &asset.files {
            let path = PathBuf::from(file.path.trim_start_matches('/'));
            if path.as_os_str().is_empty() {
                continue;
            }
            let mut parent = path.parent();
            while let Some(dir) = parent {
                if dir.as_os_str().is_empty() {
                    break;
                }
                entries.entry(dir.to_path_buf()).or_insert(None);
                parent = dir.parent();
            }
            entries.insert(path, Some(file));
        }
        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = TreeEntry<'_>> {
        self.entries.iter().map(|(path, file)| TreeEntry {
            path: path.as_path(),
            file: *file,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
