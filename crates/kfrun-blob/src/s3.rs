//! S3 and S3-compatible object storage.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use kfrun_core::BackendKind;
use tracing::{debug, Instrument};

use crate::sigv4::{HttpMethod, Presigner};
use crate::traits::default_key;
use crate::traits::{BlobBackend, BlobDownload, BlobUpload};
use crate::transfer::{check_response, read_body, read_file, write_atomic};
use crate::StorageError;

/// Static credentials for S3 request signing.
#[derive(Clone)]
pub struct S3Credentials {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token for temporary credentials.
    pub session_token: Option<String>,
}

impl S3Credentials {
    /// Create credentials from a key pair.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Builder method to set a session token.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Read `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN`.
    pub fn from_env() -> Result<Self, StorageError> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let access_key_id = var("AWS_ACCESS_KEY_ID")
            .ok_or_else(|| StorageError::Credentials("AWS_ACCESS_KEY_ID is not set".to_string()))?;
        let secret_access_key = var("AWS_SECRET_ACCESS_KEY").ok_or_else(|| {
            StorageError::Credentials("AWS_SECRET_ACCESS_KEY is not set".to_string())
        })?;

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token: var("AWS_SESSION_TOKEN"),
        })
    }
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Blob store backed by an S3 endpoint.
///
/// Every request is a SigV4 presigned URL, so the HTTP client carries no
/// provider-specific state.
pub struct S3Store {
    client: reqwest::Client,
    endpoint: String,
    region: String,
    credentials: S3Credentials,
}

impl S3Store {
    /// Create a store for `region` on the public AWS endpoint.
    pub fn new(region: impl Into<String>, credentials: S3Credentials) -> Self {
        let region = region.into();
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("https://s3.{region}.amazonaws.com"),
            region,
            credentials,
        }
    }

    /// Builder method to use an S3-compatible endpoint (MinIO, Ceph, ...).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Builder method to bound each request.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, StorageError> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| StorageError::Transport {
                backend: BackendKind::S3,
                source,
            })?;
        Ok(self)
    }

    /// Endpoint requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn presign(&self, method: HttpMethod, bucket: &str, key: &str) -> Result<String, StorageError> {
        Presigner::new(
            &self.endpoint,
            &self.region,
            &self.credentials.access_key_id,
            &self.credentials.secret_access_key,
        )
        .session_token(self.credentials.session_token.as_deref())
        .presign(method, bucket, key)
    }

    fn transport(source: reqwest::Error) -> StorageError {
        StorageError::Transport {
            backend: BackendKind::S3,
            source,
        }
    }
}

impl BlobBackend for S3Store {
    fn kind(&self) -> BackendKind {
        BackendKind::S3
    }
}

#[async_trait]
impl BlobUpload for S3Store {
    async fn upload(
        &self,
        bucket: &str,
        local_path: &Path,
        remote_key: Option<&str>,
    ) -> Result<String, StorageError> {
        let key = default_key(local_path, remote_key)?;
        let span = tracing::debug_span!("s3_upload", bucket = %bucket, key = %key);

        async {
            let body = read_file(local_path).await?;
            let url = self.presign(HttpMethod::Put, bucket, &key)?;
            debug!(bytes = body.len(), "PUT object");

            let response = self
                .client
                .put(url)
                .body(body)
                .send()
                .await
                .map_err(Self::transport)?;
            check_response(BackendKind::S3, bucket, &key, response).await?;
            Ok::<_, StorageError>(key.clone())
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl BlobDownload for S3Store {
    async fn download(
        &self,
        bucket: &str,
        remote_key: &str,
        local_path: &Path,
    ) -> Result<u64, StorageError> {
        let span =
            tracing::debug_span!("s3_download", bucket = %bucket, key = %remote_key);

        async {
            let url = self.presign(HttpMethod::Get, bucket, remote_key)?;
            debug!("GET object");

            let response = self.client.get(url).send().await.map_err(Self::transport)?;
            let response = check_response(BackendKind::S3, bucket, remote_key, response).await?;
            let bytes = read_body(BackendKind::S3, response).await?;

            write_atomic(local_path, &bytes).await?;
            Ok::<_, StorageError>(bytes.len() as u64)
        }
        .instrument(span)
        .await
    }
}
