use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::paths::{PathError, relative_key};

/// Files never uploaded, matched on file name.
const BLOCKED_FILES: &[&str] = &[".DS_Store"];

#[derive(Debug, Error)]
pub enum WalkError {
    #[error("source directory {0:?} does not exist")]
    MissingRoot(PathBuf),
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("path error: {0}")]
    Path(#[from] PathError),
}

/// One local file scheduled for sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path relative to the source directory, `/`-separated.
    pub key: String,
    pub local_path: PathBuf,
}

/// Lists every regular file under `root`, sorted by key.
///
/// Symlinks to files are included; symlinked directories are not followed.
pub async fn collect_files(root: &Path) -> Result<Vec<FileRecord>, WalkError> {
    match tokio::fs::metadata(root).await {
        Ok(meta) if meta.is_dir() => {}
        _ => return Err(WalkError::MissingRoot(root.to_path_buf())),
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|source| WalkError::Io {
            path: dir.clone(),
            source,
        })?;
        while let Some(entry) = entries.next_entry().await.map_err(|source| WalkError::Io {
            path: dir.clone(),
            source,
        })? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(|source| WalkError::Io {
                path: path.clone(),
                source,
            })?;
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if file_type.is_symlink() {
                match tokio::fs::metadata(&path).await {
                    Ok(meta) if meta.is_file() => {}
                    _ => continue,
                }
            }
            if BLOCKED_FILES
                .iter()
                .any(|blocked| entry.file_name() == *blocked)
            {
                continue;
            }
            files.push(FileRecord {
                key: relative_key(root, &path)?,
                local_path: path,
            });
        }
    }

    files.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn collects_nested_files_with_forward_slash_keys() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets/img")).unwrap();
        std::fs::write(dir.path().join("index.html"), b"<html>").unwrap();
        std::fs::write(dir.path().join("assets/app.js"), b"js").unwrap();
        std::fs::write(dir.path().join("assets/img/logo.png"), b"png").unwrap();

        let files = collect_files(dir.path()).await.unwrap();
        let keys: Vec<_> = files.iter().map(|f| f.key.as_str()).collect();

        assert_eq!(keys, vec!["assets/app.js", "assets/img/logo.png", "index.html"]);
        assert_eq!(files[2].local_path, dir.path().join("index.html"));
    }

    #[tokio::test]
    async fn skips_blocked_files_and_empty_directories() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join(".DS_Store"), b"x").unwrap();
        std::fs::write(dir.path().join("docs/.DS_Store"), b"x").unwrap();
        std::fs::write(dir.path().join("docs/readme.txt"), b"x").unwrap();

        let files = collect_files(dir.path()).await.unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].key, "docs/readme.txt");
    }

    #[tokio::test]
    async fn empty_directory_yields_no_files() {
        let dir = tempdir().unwrap();
        assert!(collect_files(dir.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            collect_files(&missing).await,
            Err(WalkError::MissingRoot(_))
        ));
    }
}
