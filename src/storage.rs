#![allow(missing_docs)]
//! Durable storage for cache entries
//!
//! A [`FileStore`] is a root directory holding one subdirectory per entry.
//! [`LocalFileStore`] maps it onto the local filesystem with `tokio::fs`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;

/// Two-level directory store: `root/{dir}/{name}`.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Names of all entry directories. A missing root yields an empty list.
    async fn list_dirs(&self) -> Result<Vec<String>>;

    /// Names of the regular files inside `dir`.
    async fn list_files(&self, dir: &str) -> Result<Vec<String>>;

    /// Read a whole file.
    async fn read(&self, dir: &str, name: &str) -> Result<Vec<u8>>;

    /// Create `dir` if needed and replace `name` with `bytes`.
    async fn write(&self, dir: &str, name: &str, bytes: &[u8]) -> Result<()>;

    /// Whether `dir/name` exists.
    async fn exists(&self, dir: &str, name: &str) -> Result<bool>;

    /// Remove `dir` with everything in it. Removing a missing dir succeeds.
    async fn remove_dir(&self, dir: &str) -> Result<()>;
}

/// [`FileStore`] backed by a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir_path(&self, dir: &str) -> PathBuf {
        self.root.join(dir)
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn list_dirs(&self) -> Result<Vec<String>> {
        let mut read_dir = match tokio::fs::read_dir(&self.root).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut dirs = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    dirs.push(name.to_string());
                }
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    async fn list_files(&self, dir: &str) -> Result<Vec<String>> {
        let mut read_dir = tokio::fs::read_dir(self.dir_path(dir)).await?;

        let mut files = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.file_type().await?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    files.push(name.to_string());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    async fn read(&self, dir: &str, name: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.dir_path(dir).join(name)).await?)
    }

    async fn write(&self, dir: &str, name: &str, bytes: &[u8]) -> Result<()> {
        let dir_path = self.dir_path(dir);
        tokio::fs::create_dir_all(&dir_path).await?;

        // Rename is atomic within a directory; readers never see a truncated file.
        let tmp_path = dir_path.join(format!(".{}.tmp", name));
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, dir_path.join(name)).await?;

        debug!("Wrote {}/{} ({} bytes)", dir, name, bytes.len());
        Ok(())
    }

    async fn exists(&self, dir: &str, name: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.dir_path(dir).join(name)).await?)
    }

    async fn remove_dir(&self, dir: &str) -> Result<()> {
        match tokio::fs::remove_dir_all(self.dir_path(dir)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
