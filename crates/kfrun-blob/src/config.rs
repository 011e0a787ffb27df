//! Storage configuration and backend selection.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kfrun_core::BackendKind;
use tracing::info;

use crate::{BlobStore, GcsStore, LocalStore, S3Credentials, S3Store, StorageError};

/// Blob storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Backend selector (`s3`, `gcs`, `local` and their aliases).
    pub backend: String,

    /// Default bucket for uploads and downloads.
    pub bucket: String,

    /// Endpoint override for S3-compatible stores or GCS emulators.
    pub endpoint: Option<String>,

    /// S3 region.
    pub region: String,

    /// Root directory for the local backend.
    pub local_root: PathBuf,

    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "s3".to_string(),
            bucket: String::new(),
            endpoint: None,
            region: "us-east-1".to_string(),
            local_root: PathBuf::from(".kfrun/blobs"),
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl StorageConfig {
    /// Defaults overlaid with `KFRUN_BACKEND`, `KFRUN_BUCKET`,
    /// `KFRUN_STORAGE_ENDPOINT` and `AWS_REGION`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        if let Some(backend) = var("KFRUN_BACKEND") {
            config.backend = backend;
        }
        if let Some(bucket) = var("KFRUN_BUCKET") {
            config.bucket = bucket;
        }
        config.endpoint = var("KFRUN_STORAGE_ENDPOINT");
        if let Some(region) = var("AWS_REGION") {
            config.region = region;
        }
        config
    }

    /// Parse the backend selector.
    pub fn kind(&self) -> Result<BackendKind, StorageError> {
        self.backend
            .parse()
            .map_err(|_| StorageError::UnknownBackend(self.backend.clone()))
    }
}

/// Open the store selected by `config`.
///
/// The selector is parsed here, once; callers hold the returned trait object.
/// Provider credentials come from the environment.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn BlobStore>, StorageError> {
    let kind = config.kind()?;
    info!(backend = %kind, endpoint = ?config.endpoint, "Opening blob store");

    let store: Arc<dyn BlobStore> = match kind {
        BackendKind::S3 => {
            let mut store = S3Store::new(config.region.clone(), S3Credentials::from_env()?)
                .with_timeout(config.request_timeout)?;
            if let Some(endpoint) = &config.endpoint {
                store = store.with_endpoint(endpoint.clone());
            }
            Arc::new(store)
        }
        BackendKind::Gcs => {
            let mut store = GcsStore::from_env()?.with_timeout(config.request_timeout)?;
            if let Some(endpoint) = &config.endpoint {
                store = store.with_endpoint(endpoint)?;
            }
            Arc::new(store)
        }
        BackendKind::Local => Arc::new(LocalStore::new(config.local_root.clone())),
    };
    Ok(store)
}
