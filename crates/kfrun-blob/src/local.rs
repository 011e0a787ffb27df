//! Filesystem-backed store.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use kfrun_core::BackendKind;
use tracing::debug;

use crate::traits::default_key;
use crate::traits::{BlobBackend, BlobDownload, BlobUpload};
use crate::transfer::{read_file, write_atomic};
use crate::StorageError;

/// Blob store rooted at a local directory.
///
/// `bucket/key` maps to `<root>/<bucket>/<key>`. Used for local runs and
/// in tests.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an object maps to. Keys may not escape the bucket directory.
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let mut path = self.root.clone();
        for part in [bucket, key] {
            let rel = Path::new(part);
            let safe = !part.is_empty()
                && rel
                    .components()
                    .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
            if !safe {
                return Err(StorageError::InvalidKey(format!("{bucket}/{key}")));
            }
            path.push(rel);
        }
        Ok(path)
    }
}

impl BlobBackend for LocalStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }
}

#[async_trait]
impl BlobUpload for LocalStore {
    async fn upload(
        &self,
        bucket: &str,
        local_path: &Path,
        remote_key: Option<&str>,
    ) -> Result<String, StorageError> {
        let key = default_key(local_path, remote_key)?;
        let target = self.object_path(bucket, &key)?;
        let bytes = read_file(local_path).await?;

        debug!(target = %target.display(), bytes = bytes.len(), "Writing local object");
        write_atomic(&target, &bytes).await?;
        Ok(key)
    }
}

#[async_trait]
impl BlobDownload for LocalStore {
    async fn download(
        &self,
        bucket: &str,
        remote_key: &str,
        local_path: &Path,
    ) -> Result<u64, StorageError> {
        let source = self.object_path(bucket, remote_key)?;
        let bytes = match tokio::fs::read(&source).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    backend: BackendKind::Local,
                    bucket: bucket.to_string(),
                    key: remote_key.to_string(),
                })
            }
            Err(e) => return Err(StorageError::io(source, e)),
        };

        write_atomic(local_path, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}
