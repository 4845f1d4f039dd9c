//! Virtual file trees shipped to agents, and the vault that decrypts them

pub mod asset;
pub mod error;
pub mod loader;
pub mod vault;

pub use asset::{Asset, AssetFile, AssetTree, TreeEntry, S_IFDIR};
pub use error::{AssetError, VaultError};
pub use loader::{dir_to_asset, normalize_mode};
pub use vault::{AgeDecryptor, AnsibleVaultDecryptor, Decryptor, Vault};
