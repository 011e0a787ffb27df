//! Download capability.

use std::path::Path;

use async_trait::async_trait;
use tracing::{error, info};

use super::BlobBackend;
use crate::StorageError;

/// Copy objects from the store to local files.
#[async_trait]
pub trait BlobDownload: BlobBackend {
    /// Download `bucket/remote_key` to `local_path`. Returns the byte count.
    ///
    /// On failure `local_path` is left untouched.
    async fn download(
        &self,
        bucket: &str,
        remote_key: &str,
        local_path: &Path,
    ) -> Result<u64, StorageError>;

    /// Download, logging and demoting any failure to `false`.
    async fn download_or_log(&self, bucket: &str, remote_key: &str, local_path: &Path) -> bool {
        match self.download(bucket, remote_key, local_path).await {
            Ok(bytes) => {
                info!(backend = %self.kind(), bucket = %bucket, key = %remote_key, bytes, "Downloaded blob");
                true
            }
            Err(e) => {
                error!(
                    backend = %self.kind(),
                    bucket = %bucket,
                    key = %remote_key,
                    error = %e,
                    "Blob download failed"
                );
                false
            }
        }
    }
}
