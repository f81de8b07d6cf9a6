use std::path::{Component, Path};

use bucket_sync_core::encode_invalidation_path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("{0:?} is not under the source directory")]
    OutsideRoot(std::path::PathBuf),
    #[error("{0:?} contains an unsupported component")]
    UnsupportedComponent(std::path::PathBuf),
}

/// Maps a file under `root` to its forward-slash key, whatever the host separator.
pub fn relative_key(root: &Path, path: &Path) -> Result<String, PathError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| PathError::OutsideRoot(path.to_path_buf()))?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => continue,
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::UnsupportedComponent(path.to_path_buf()));
            }
        }
    }
    Ok(parts.join("/"))
}

/// `\` becomes `/`; leading and trailing slashes are dropped.
pub fn normalize_prefix(raw: &str) -> String {
    raw.replace('\\', "/").trim_matches('/').to_string()
}

pub fn object_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}/{key}")
    }
}

/// CDN path for `key`, rooted at `/`. Only the key is `~`-encoded; the
/// prefix is used as configured.
pub fn invalidation_path(prefix: &str, key: &str) -> String {
    let path = object_key(prefix, &encode_invalidation_path(key));
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}
