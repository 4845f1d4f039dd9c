//! File ownership utilities

use std::path::Path;

use super::FileError;

/// Resolve a user name (or numeric uid) to a uid
#[cfg(unix)]
pub fn resolve_user(user: &str) -> Result<u32, FileError> {
    use nix::unistd::User;

    if let Ok(uid) = user.parse::<u32>() {
        return Ok(uid);
    }

    match User::from_name(user) {
        Ok(Some(found)) => Ok(found.uid.as_raw()),
        Ok(None) => Err(FileError::Ownership {
            path: String::new(),
            reason: format!("unknown user {user}"),
        }),
        Err(errno) => Err(FileError::Ownership {
            path: String::new(),
            reason: format!("lookup of user {user} failed: {errno}"),
        }),
    }
}

/// Resolve a group name (or numeric gid) to a gid
#[cfg(unix)]
pub fn resolve_group(group: &str) -> Result<u32, FileError> {
    use nix::unistd::Group;

    if let Ok(gid) = group.parse::<u32>() {
        return Ok(gid);
    }

    match Group::from_name(group) {
        Ok(Some(found)) => Ok(found.gid.as_raw()),
        Ok(None) => Err(FileError::Ownership {
            path: String::new(),
            reason: format!("unknown group {group}"),
        }),
        Err(errno) => Err(FileError::Ownership {
            path: String::new(),
            reason: format!("lookup of group {group} failed: {errno}"),
        }),
    }
}

/// Password database entry of a user
#[derive(Debug, Clone)]
pub struct UserEntry {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: std::path::PathBuf,
}

#[cfg(unix)]
impl From<nix::unistd::User> for UserEntry {
    fn from(user: nix::unistd::User) -> Self {
        Self {
            name: user.name,
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            home: user.dir,
        }
    }
}

#[cfg(unix)]
pub fn lookup_user(name: &str) -> Option<UserEntry> {
    nix::unistd::User::from_name(name)
        .ok()
        .flatten()
        .map(UserEntry::from)
}

/// The user this process runs as
#[cfg(unix)]
pub fn current_user() -> Option<UserEntry> {
    nix::unistd::User::from_uid(nix::unistd::Uid::current())
        .ok()
        .flatten()
        .map(UserEntry::from)
}

/// Numeric owner and group of a path
#[cfg(unix)]
pub async fn get_ownership_ids(path: &Path) -> Result<(u32, u32), FileError> {
    use std::os::unix::fs::MetadataExt;

    let metadata = tokio::fs::metadata(path).await?;
    Ok((metadata.uid(), metadata.gid()))
}

/// Change owner and/or group to the given ids, but only the ones that differ
/// from the current numeric ownership. Returns whether anything changed.
#[cfg(unix)]
pub async fn ensure_ownership(
    path: &Path,
    uid: Option<u32>,
    gid: Option<u32>,
) -> Result<bool, FileError> {
    use nix::unistd::{chown, Gid, Uid};

    if uid.is_none() && gid.is_none() {
        return Ok(false);
    }

    let (current_uid, current_gid) = get_ownership_ids(path).await?;
    let new_uid = uid.filter(|&u| u != current_uid).map(Uid::from_raw);
    let new_gid = gid.filter(|&g| g != current_gid).map(Gid::from_raw);

    if new_uid.is_none() && new_gid.is_none() {
        return Ok(false);
    }

    chown(path, new_uid, new_gid).map_err(|errno| match errno {
        nix::errno::Errno::EPERM | nix::errno::Errno::EACCES => FileError::PermissionDenied {
            path: path.display().to_string(),
        },
        other => FileError::Ownership {
            path: path.display().to_string(),
            reason: other.to_string(),
        },
    })?;
    Ok(true)
}

#[cfg(not(unix))]
pub async fn ensure_ownership(
    _path: &Path,
    uid: Option<u32>,
    gid: Option<u32>,
) -> Result<bool, FileError> {
    if uid.is_some() || gid.is_some() {
        tracing::warn!("File ownership changes are not supported on this platform");
    }
    Ok(false)
}
