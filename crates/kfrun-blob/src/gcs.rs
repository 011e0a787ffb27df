//! Google Cloud Storage through the JSON API.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use kfrun_core::BackendKind;
use reqwest::Url;
use tracing::{debug, Instrument};

use crate::traits::default_key;
use crate::traits::{BlobBackend, BlobDownload, BlobUpload};
use crate::transfer::{check_response, read_body, read_file, write_atomic};
use crate::StorageError;

/// Public GCS endpoint.
pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Blob store backed by Google Cloud Storage.
///
/// Authenticates with an OAuth2 bearer token supplied by the caller.
pub struct GcsStore {
    client: reqwest::Client,
    endpoint: Url,
    token: String,
}

impl GcsStore {
    /// Create a store on the public endpoint.
    pub fn new(token: impl Into<String>) -> Result<Self, StorageError> {
        let token = token.into();
        if token.is_empty() {
            return Err(StorageError::Credentials("GCS access token is empty".to_string()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: parse_endpoint(DEFAULT_GCS_ENDPOINT)?,
            token,
        })
    }

    /// Read the token from `GOOGLE_OAUTH_ACCESS_TOKEN`.
    pub fn from_env() -> Result<Self, StorageError> {
        let token = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN").map_err(|_| {
            StorageError::Credentials("GOOGLE_OAUTH_ACCESS_TOKEN is not set".to_string())
        })?;
        Self::new(token)
    }

    /// Builder method to use a different endpoint (emulators, private access).
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, StorageError> {
        self.endpoint = parse_endpoint(endpoint)?;
        Ok(self)
    }

    /// Builder method to bound each request.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, StorageError> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Self::transport)?;
        Ok(self)
    }

    /// `POST /upload/storage/v1/b/{bucket}/o?uploadType=media&name={key}`
    fn upload_url(&self, bucket: &str, key: &str) -> Result<Url, StorageError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(["upload", "storage", "v1", "b", bucket, "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);
        Ok(url)
    }

    /// `GET /storage/v1/b/{bucket}/o/{key}?alt=media`, key as one segment.
    fn download_url(&self, bucket: &str, key: &str) -> Result<Url, StorageError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", bucket, "o", key]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    fn transport(source: reqwest::Error) -> StorageError {
        StorageError::Transport {
            backend: BackendKind::Gcs,
            source,
        }
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, StorageError> {
    let url = Url::parse(endpoint).map_err(|_| StorageError::InvalidEndpoint(endpoint.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(StorageError::InvalidEndpoint(endpoint.to_string()));
    }
    Ok(url)
}

impl BlobBackend for GcsStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Gcs
    }
}

#[async_trait]
impl BlobUpload for GcsStore {
    async fn upload(
        &self,
        bucket: &str,
        local_path: &Path,
        remote_key: Option<&str>,
    ) -> Result<String, StorageError> {
        let key = default_key(local_path, remote_key)?;
        let span = tracing::debug_span!("gcs_upload", bucket = %bucket, key = %key);

        async {
            let body = read_file(local_path).await?;
            let url = self.upload_url(bucket, &key)?;
            debug!(bytes = body.len(), "POST object");

            let response = self
                .client
                .post(url)
                .bearer_auth(&self.token)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(body)
                .send()
                .await
                .map_err(Self::transport)?;
            check_response(BackendKind::Gcs, bucket, &key, response).await?;
            Ok::<_, StorageError>(key.clone())
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl BlobDownload for GcsStore {
    async fn download(
        &self,
        bucket: &str,
        remote_key: &str,
        local_path: &Path,
    ) -> Result<u64, StorageError> {
        let span =
            tracing::debug_span!("gcs_download", bucket = %bucket, key = %remote_key);

        async {
            let url = self.download_url(bucket, remote_key)?;
            debug!("GET object");

            let response = self
                .client
                .get(url)
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(Self::transport)?;
            let response = check_response(BackendKind::Gcs, bucket, remote_key, response).await?;
            let bytes = read_body(BackendKind::Gcs, response).await?;

            write_atomic(local_path, &bytes).await?;
            Ok::<_, StorageError>(bytes.len() as u64)
        }
        .instrument(span)
        .await
    }
}
