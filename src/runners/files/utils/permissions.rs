//! File permission utilities

use std::path::Path;

use super::FileError;

/// Parse an octal mode such as `0644`, `644` or `022`
pub fn parse_mode(mode: &str) -> Result<u32, FileError> {
    let digits = mode.trim();
    if digits.is_empty() || !digits.chars().all(|c| ('0'..='7').contains(&c)) {
        return Err(FileError::InvalidPermissions {
            mode: mode.to_string(),
        });
    }
    let value = u32::from_str_radix(digits, 8).map_err(|_| FileError::InvalidPermissions {
        mode: mode.to_string(),
    })?;
    if value > 0o7777 {
        return Err(FileError::InvalidPermissions {
            mode: mode.to_string(),
        });
    }
    Ok(value)
}

/// Permission bits (including setuid/setgid/sticky) of a path
#[cfg(unix)]
pub async fn get_mode(path: &Path) -> Result<u32, FileError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = tokio::fs::metadata(path).await?;
    Ok(metadata.permissions().mode() & 0o7777)
}

#[cfg(unix)]
pub async fn set_mode(path: &Path, mode: u32) -> Result<(), FileError> {
    use std::os::unix::fs::PermissionsExt;

    let permissions = std::fs::Permissions::from_mode(mode);
    tokio::fs::set_permissions(path, permissions).await?;
    Ok(())
}

/// Set `mode` unless the path already has it. Returns whether it changed.
#[cfg(unix)]
pub async fn ensure_mode(path: &Path, mode: u32) -> Result<bool, FileError> {
    if get_mode(path).await? == mode {
        return Ok(false);
    }
    set_mode(path, mode).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_octal_mode() {
        assert_eq!(parse_mode("644").unwrap(), 0o644);
        assert_eq!(parse_mode("0755").unwrap(), 0o755);
        assert_eq!(parse_mode("022").unwrap(), 0o022);
        assert_eq!(parse_mode("0").unwrap(), 0);
    }

    #[test]
    fn test_parse_invalid_mode() {
        assert!(parse_mode("").is_err());
        assert!(parse_mode("u+x").is_err());
        assert!(parse_mode("0899").is_err());
        assert!(parse_mode("177777").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ensure_mode_is_idempotent() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        assert!(ensure_mode(temp_file.path(), 0o640).await.unwrap());
        assert!(!ensure_mode(temp_file.path(), 0o640).await.unwrap());
        assert_eq!(get_mode(temp_file.path()).await.unwrap(), 0o640);
    }
}
