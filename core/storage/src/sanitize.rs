//! Confinement of logical paths to a directory on a real filesystem.
//!
//! `StoragePath` already rejects lexical escapes (`..` above the root).
//! On disk a symbolic link inside the root can still point elsewhere, so
//! every resolved path is re-checked after following links.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use fileengine_common::{Error, Result, StoragePath};

/// A canonical directory that all resolved paths must stay inside.
#[derive(Debug, Clone)]
pub struct DiskRoot {
    root: PathBuf,
}

impl DiskRoot {
    /// Create the root (if missing) and pin its canonical location.
    ///
    /// # Errors
    /// - Root cannot be created or canonicalized
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();

        // Sync is fine here, this runs once at startup.
        if !root.exists() {
            std::fs::create_dir_all(root)?;
        }
        let root = std::fs::canonicalize(root)?;

        Ok(Self { root })
    }

    /// Canonical root directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Join a logical path onto the root without touching the disk.
    pub fn lexical(&self, path: &StoragePath) -> PathBuf {
        let mut fs_path = self.root.clone();
        for component in path.components() {
            fs_path.push(component);
        }
        fs_path
    }

    /// Resolve a logical path and verify it stays inside the root once
    /// symbolic links are followed.
    pub async fn resolve(&self, path: &StoragePath) -> Result<PathBuf> {
        let full = self.lexical(path);
        self.verify_confined(path, &full).await?;
        Ok(full)
    }

    /// Canonicalize the deepest existing ancestor of `full` and require it
    /// to live under the root. Dangling links are refused outright.
    async fn verify_confined(&self, path: &StoragePath, full: &Path) -> Result<()> {
        let mut candidate = full.to_path_buf();

        loop {
            match fs::canonicalize(&candidate).await {
                Ok(real) => {
                    if real.starts_with(&self.root) {
                        return Ok(());
                    }
                    return Err(Error::PathOutsideRoot(path.to_string()));
                }
                // NotADirectory: an ancestor is a regular file; its own
                // parent is still a valid place to check confinement.
                Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                    if fs::symlink_metadata(&candidate).await.is_ok() {
                        // Exists as a link but its target does not.
                        return Err(Error::PathOutsideRoot(path.to_string()));
                    }
                    if candidate == self.root {
                        return Ok(());
                    }
                    match candidate.parent() {
                        Some(parent) => candidate = parent.to_path_buf(),
                        None => return Ok(()),
                    }
                }
                Err(e) => return Err(Error::backend("resolve", path.to_string(), e)),
            }
        }
    }
}
