//! Shared plumbing for HTTP-backed stores.

use std::path::Path;

use kfrun_core::BackendKind;
use reqwest::{Response, StatusCode};

use crate::resolve::ensure_dir;
use crate::StorageError;

/// Read a local file for upload.
pub(crate) async fn read_file(path: &Path) -> Result<Vec<u8>, StorageError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| StorageError::io(path, e))
}

/// Map a provider response to an error unless it succeeded.
pub(crate) async fn check_response(
    backend: BackendKind,
    bucket: &str,
    key: &str,
    response: Response,
) -> Result<Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(StorageError::NotFound {
            backend,
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
    }

    let message = response.text().await.unwrap_or_default();
    Err(StorageError::Provider {
        backend,
        bucket: bucket.to_string(),
        key: key.to_string(),
        status: status.as_u16(),
        message: message.chars().take(512).collect(),
    })
}

/// Read a download body.
///
/// A body shorter than its `Content-Length` fails in the HTTP layer and is
/// reported as a transport error.
pub(crate) async fn read_body(backend: BackendKind, response: Response) -> Result<Vec<u8>, StorageError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|source| StorageError::Transport { backend, source })?;
    Ok(bytes.to_vec())
}

/// Write `bytes` to `path` via a sibling temp file and rename.
///
/// A failed write leaves any existing file at `path` untouched.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent).await?;
    }

    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .ok_or_else(|| StorageError::InvalidKey(path.display().to_string()))?;
    tmp_name.push(".part");
    let tmp = path.with_file_name(tmp_name);

    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StorageError::io(&tmp, e));
    }
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StorageError::io(path, e))
}
