//! Per-subtree ownership, umask and notify overrides for the tree runner

use crate::playbook::{parse_arg_string, split_list, TaskArgs, POSITIONAL_ARG};
use crate::runners::error::RunnerError;
use crate::runners::files::utils::{parse_mode, resolve_group, resolve_user};

const META_KEYS: &[&str] = &["owner", "group", "umask", "notify"];

/// Overrides resolved for one path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMeta {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub umask: Option<u32>,
    pub notify: Vec<String>,
}

/// Overrides keyed by tree path prefix (`/etc/nginx`), sorted so that a
/// shallower prefix is applied before the deeper ones below it
#[derive(Debug, Clone, Default)]
pub struct PrefixMetaMap {
    prefixes: Vec<(String, PathMeta)>,
}

impl PrefixMetaMap {
    /// Build from every argument whose key starts with `/`. Values use the
    /// shorthand syntax: `owner=www-data group=www-data umask=027 notify=reload`.
    pub fn from_args(args: &TaskArgs) -> Result<Self, RunnerError> {
        let mut prefixes = Vec::new();

        for (key, value) in args.iter().filter(|(key, _)| key.starts_with('/')) {
            let spec = value.as_str().ok_or_else(|| RunnerError::InvalidArgument {
                arg: key.clone(),
                reason: format!("prefix override must be a string, got {value}"),
            })?;
            prefixes.push((normalize_prefix(key), parse_meta(key, spec)?));
        }

        prefixes.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Self { prefixes })
    }

    /// Compose the overrides of every prefix containing `path`. Deeper
    /// prefixes replace owner, group and umask; notify names accumulate.
    pub fn resolve(&self, path: &str) -> PathMeta {
        let mut meta = PathMeta::default();
        for (prefix, prefix_meta) in &self.prefixes {
            if !matches_prefix(path, prefix) {
                continue;
            }
            if prefix_meta.uid.is_some() {
                meta.uid = prefix_meta.uid;
            }
            if prefix_meta.gid.is_some() {
                meta.gid = prefix_meta.gid;
            }
            if prefix_meta.umask.is_some() {
                meta.umask = prefix_meta.umask;
            }
            meta.notify.extend(prefix_meta.notify.iter().cloned());
        }
        meta
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Component-aware: `/a` contains `/a` and `/a/b`, not `/ab`
fn matches_prefix(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn parse_meta(prefix: &str, spec: &str) -> Result<PathMeta, RunnerError> {
    let attrs = parse_arg_string(spec);
    let invalid = |reason: String| RunnerError::InvalidArgument {
        arg: prefix.to_string(),
        reason,
    };

    for key in attrs.keys() {
        if key != POSITIONAL_ARG && !META_KEYS.contains(&key.as_str()) {
            return Err(invalid(format!("unknown override '{key}'")));
        }
    }
    if let Some(extra) = attrs.get(POSITIONAL_ARG).and_then(|v| v.as_str()) {
        if !extra.is_empty() {
            return Err(invalid(format!("unexpected '{extra}'")));
        }
    }

    let attr = |key: &str| {
        attrs
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    };

    let uid = match attr("owner") {
        Some(owner) => Some(resolve_user(owner).map_err(|_| RunnerError::UnknownUser {
            name: owner.to_string(),
        })?),
        None => None,
    };
    let gid = match attr("group") {
        Some(group) => Some(resolve_group(group).map_err(|_| RunnerError::UnknownGroup {
            name: group.to_string(),
        })?),
        None => None,
    };
    let umask = match attr("umask") {
        Some(umask) => Some(
            parse_mode(umask).map_err(|_| invalid(format!("cannot parse octal umask {umask}")))?,
        ),
        None => None,
    };
    let notify = attr("notify").map(split_list).unwrap_or_default();

    Ok(PathMeta {
        uid,
        gid,
        umask,
        notify,
    })
}
