//! Transparent decryption of encrypted asset files

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use super::error::VaultError;

/// Magic prefix of age encrypted files
pub const AGE_MAGIC: &[u8] = b"age-encryption.org/v1";

/// Magic prefix of Ansible vault files
pub const ANSIBLE_MAGIC: &[u8] = b"$ANSIBLE_VAULT;";

/// Decrypts one encrypted file format, recognized by a fixed magic prefix
pub trait Decryptor: Send + Sync {
    fn format(&self) -> &'static str;

    fn magic(&self) -> &'static [u8];

    fn decrypt(&self, path: &Path) -> Result<Vec<u8>, VaultError>;
}

/// Opens files, decrypting the ones that start with a registered magic prefix.
/// Everything else is returned as raw bytes.
#[derive(Default)]
pub struct Vault {
    decryptors: Vec<Box<dyn Decryptor>>,
}

impl Vault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vault with the age and Ansible decryptors registered
    pub fn with_keys(age_identity: Option<PathBuf>, password_file: Option<PathBuf>) -> Self {
        let mut vault = Self::new();
        vault.register(Box::new(AgeDecryptor {
            identity: age_identity,
        }));
        vault.register(Box::new(AnsibleVaultDecryptor { password_file }));
        vault
    }

    pub fn register(&mut self, decryptor: Box<dyn Decryptor>) {
        self.decryptors.push(decryptor);
    }

    pub fn open(&self, path: &Path) -> Result<Vec<u8>, VaultError> {
        let read_err = |source| VaultError::Read {
            path: path.display().to_string(),
            source,
        };

        let max_magic = self.decryptors.iter().map(|d| d.magic().len()).max();
        if let Some(len) = max_magic {
            let mut header = Vec::with_capacity(len);
            std::fs::File::open(path)
                .map_err(read_err)?
                .take(len as u64)
                .read_to_end(&mut header)
                .map_err(read_err)?;

            if let Some(decryptor) = self
                .decryptors
                .iter()
                .find(|d| header.starts_with(d.magic()))
            {
                debug!("Decrypting {} as {}", path.display(), decryptor.format());
                return decryptor.decrypt(path);
            }
        }

        std::fs::read(path).map_err(read_err)
    }
}

/// Decrypts age files through the `age` command
pub struct AgeDecryptor {
    pub identity: Option<PathBuf>,
}

impl Decryptor for AgeDecryptor {
    fn format(&self) -> &'static str {
        "age"
    }

    fn magic(&self) -> &'static [u8] {
        AGE_MAGIC
    }

    fn decrypt(&self, path: &Path) -> Result<Vec<u8>, VaultError> {
        let identity = self.identity.as_ref().ok_or_else(|| VaultError::MissingKey {
            format: self.format().to_string(),
            path: path.display().to_string(),
            hint: "set vault.age_identity".to_string(),
        })?;

        let mut cmd = Command::new("age");
        cmd.arg("--decrypt").arg("-i").arg(identity).arg(path);
        run_decrypt(cmd, "age", path)
    }
}

/// Decrypts Ansible vault files through `ansible-vault view`
pub struct AnsibleVaultDecryptor {
    pub password_file: Option<PathBuf>,
}

impl Decryptor for AnsibleVaultDecryptor {
    fn format(&self) -> &'static str {
        "ansible-vault"
    }

    fn magic(&self) -> &'static [u8] {
        ANSIBLE_MAGIC
    }

    fn decrypt(&self, path: &Path) -> Result<Vec<u8>, VaultError> {
        let password_file = self
            .password_file
            .as_ref()
            .ok_or_else(|| VaultError::MissingKey {
                format: self.format().to_string(),
                path: path.display().to_string(),
                hint: "set vault.password_file".to_string(),
            })?;

        let mut cmd = Command::new("ansible-vault");
        cmd.arg("view")
            .arg("--vault-password-file")
            .arg(password_file)
            .arg(path);
        run_decrypt(cmd, "ansible-vault", path)
    }
}

fn run_decrypt(mut cmd: Command, command: &str, path: &Path) -> Result<Vec<u8>, VaultError> {
    let output = cmd.output().map_err(|source| VaultError::Spawn {
        command: command.to_string(),
        source,
    })?;

    if !output.status.success() {
        return Err(VaultError::DecryptFailed {
            command: command.to_string(),
            path: path.display().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}
