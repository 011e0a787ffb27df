//! Job-side artifact resolution.

use std::path::Path;
use std::sync::Arc;

use kfrun_core::ArtifactLocation;
use tracing::{info, warn};

use crate::{BlobStore, StorageError};

/// Create `path` and its parents. Succeeds if it already exists.
pub async fn ensure_dir(path: &Path) -> Result<(), StorageError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| StorageError::io(path, e))
}

/// Where a resolved artifact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Downloaded from the store.
    Remote,
    /// Remote fetch failed; an existing local copy was used.
    Local,
}

/// Moves artifacts between the store and a job's working directory.
///
/// With `local_mode` off, every remote failure is an error. With it on, a
/// failed download falls back to a file already present at the destination,
/// so a job can be run by hand against local data.
pub struct ArtifactResolver {
    store: Arc<dyn BlobStore>,
    local_mode: bool,
}

impl ArtifactResolver {
    /// Create a resolver over `store` with local fallback disabled.
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            local_mode: false,
        }
    }

    /// Builder method to enable or disable the local fallback.
    pub fn with_local_mode(mut self, local_mode: bool) -> Self {
        self.local_mode = local_mode;
        self
    }

    /// Whether local fallback is enabled.
    pub fn local_mode(&self) -> bool {
        self.local_mode
    }

    /// Fetch `location` into `dest`.
    pub async fn fetch(
        &self,
        location: &ArtifactLocation,
        dest: &Path,
    ) -> Result<Resolution, StorageError> {
        let result = match self.check_backend(location) {
            Ok(()) => self.store.download(&location.bucket, &location.key, dest).await,
            Err(e) => Err(e),
        };

        let error = match result {
            Ok(bytes) => {
                info!(uri = %location, dest = %dest.display(), bytes, "Fetched artifact");
                return Ok(Resolution::Remote);
            }
            Err(e) => e,
        };

        let has_local_copy = self.local_mode && tokio::fs::try_exists(dest).await.unwrap_or(false);
        if has_local_copy {
            warn!(
                uri = %location,
                dest = %dest.display(),
                error = %error,
                "Remote artifact unavailable, using local copy"
            );
            return Ok(Resolution::Local);
        }

        Err(StorageError::RemoteUnavailable {
            uri: location.uri(),
            source: Box::new(error),
        })
    }

    /// Publish the local file `src` to `location`.
    pub async fn publish(&self, src: &Path, location: &ArtifactLocation) -> Result<(), StorageError> {
        self.check_backend(location)?;
        self.store
            .upload(&location.bucket, src, Some(&location.key))
            .await?;
        info!(uri = %location, src = %src.display(), "Published artifact");
        Ok(())
    }

    fn check_backend(&self, location: &ArtifactLocation) -> Result<(), StorageError> {
        let expected = self.store.kind();
        if location.backend != expected {
            return Err(StorageError::BackendMismatch {
                expected,
                found: location.backend,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocalStore;
    use kfrun_core::BackendKind;

    fn resolver(root: &Path) -> ArtifactResolver {
        ArtifactResolver::new(Arc::new(LocalStore::new(root)))
    }

    #[tokio::test]
    async fn test_ensure_dir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c");
        ensure_dir(&path).await.unwrap();
        ensure_dir(&path).await.unwrap();
        assert!(path.is_dir());
    }

    #[tokio::test]
    async fn test_publish_then_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(&dir.path().join("store"));
        let location = ArtifactLocation::for_output(BackendKind::Local, "data", "runs/r1", "train", "model_path");

        let src = dir.path().join("model.pkl");
        tokio::fs::write(&src, b"weights").await.unwrap();
        resolver.publish(&src, &location).await.unwrap();

        let dest = dir.path().join("work/model.pkl");
        assert_eq!(resolver.fetch(&location, &dest).await.unwrap(), Resolution::Remote);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"weights");
    }

    #[tokio::test]
    async fn test_no_fallback_without_local_mode() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(&dir.path().join("store"));
        let location = ArtifactLocation::new(BackendKind::Local, "data", "train.npz");

        let dest = dir.path().join("train.npz");
        tokio::fs::write(&dest, b"stale").await.unwrap();

        let err = resolver.fetch(&location, &dest).await.unwrap_err();
        match err {
            StorageError::RemoteUnavailable { uri, source } => {
                assert_eq!(uri, "file://data/train.npz");
                assert!(matches!(*source, StorageError::NotFound { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_local_mode_uses_existing_copy() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(&dir.path().join("store")).with_local_mode(true);
        let location = ArtifactLocation::new(BackendKind::Local, "data", "train.npz");

        let dest = dir.path().join("train.npz");
        tokio::fs::write(&dest, b"local").await.unwrap();

        assert_eq!(resolver.fetch(&location, &dest).await.unwrap(), Resolution::Local);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"local");
    }

    #[tokio::test]
    async fn test_local_mode_without_copy_fails() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(&dir.path().join("store")).with_local_mode(true);
        let location = ArtifactLocation::new(BackendKind::Local, "data", "train.npz");

        let result = resolver.fetch(&location, &dir.path().join("absent")).await;
        assert!(matches!(result, Err(StorageError::RemoteUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_backend_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(dir.path());
        let location = ArtifactLocation::new(BackendKind::S3, "data", "k");

        let result = resolver.publish(&dir.path().join("x"), &location).await;
        assert!(matches!(
            result,
            Err(StorageError::BackendMismatch {
                expected: BackendKind::Local,
                found: BackendKind::S3
            })
        ));
    }
}
