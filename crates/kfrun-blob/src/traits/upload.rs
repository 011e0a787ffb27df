//! Upload capability.

use std::path::Path;

use async_trait::async_trait;
use tracing::{error, info};

use super::BlobBackend;
use crate::StorageError;

/// Copy local files into the store.
///
/// Uploads overwrite any existing object. Concurrent uploads to the same
/// key are last-writer-wins.
#[async_trait]
pub trait BlobUpload: BlobBackend {
    /// Upload `local_path` to `bucket/remote_key`.
    ///
    /// `remote_key` defaults to the file's base name. Returns the key written.
    async fn upload(
        &self,
        bucket: &str,
        local_path: &Path,
        remote_key: Option<&str>,
    ) -> Result<String, StorageError>;

    /// Upload, logging and demoting any failure to `false`.
    async fn upload_or_log(&self, bucket: &str, local_path: &Path, remote_key: Option<&str>) -> bool {
        match self.upload(bucket, local_path, remote_key).await {
            Ok(key) => {
                info!(backend = %self.kind(), bucket = %bucket, key = %key, "Uploaded blob");
                true
            }
            Err(e) => {
                error!(
                    backend = %self.kind(),
                    bucket = %bucket,
                    path = %local_path.display(),
                    error = %e,
                    "Blob upload failed"
                );
                false
            }
        }
    }
}

/// Key used when the caller does not name one: the file's base name.
pub(crate) fn default_key(local_path: &Path, remote_key: Option<&str>) -> Result<String, StorageError> {
    if let Some(key) = remote_key {
        return Ok(key.to_string());
    }
    local_path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| StorageError::InvalidKey(local_path.display().to_string()))
}
