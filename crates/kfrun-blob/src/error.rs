//! Storage errors.

use std::path::PathBuf;

use kfrun_core::BackendKind;
use thiserror::Error;

/// Errors from blob uploads and downloads.
///
/// A body cut short mid-transfer surfaces as [`StorageError::Transport`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// Local file could not be read or written.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Network failure talking to the provider.
    #[error("{backend} transport error: {source}")]
    Transport {
        backend: BackendKind,
        #[source]
        source: reqwest::Error,
    },

    /// Provider rejected the request (auth denied, missing bucket, ...).
    #[error("{backend} rejected {bucket}/{key}: HTTP {status}: {message}")]
    Provider {
        backend: BackendKind,
        bucket: String,
        key: String,
        status: u16,
        message: String,
    },

    /// Object does not exist.
    #[error("{backend} object not found: {bucket}/{key}")]
    NotFound {
        backend: BackendKind,
        bucket: String,
        key: String,
    },

    /// Credentials missing or unusable.
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// Object key that cannot be mapped safely.
    #[error("Invalid object key '{0}'")]
    InvalidKey(String),

    /// Storage backend selector outside the supported set.
    #[error("Unknown storage backend '{0}'")]
    UnknownBackend(String),

    /// Artifact lives on a different backend than the configured store.
    #[error("Artifact on {found} but store is {expected}")]
    BackendMismatch {
        expected: BackendKind,
        found: BackendKind,
    },

    /// Invalid endpoint URL.
    #[error("Invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    /// Remote fetch failed and no local copy could stand in for it.
    #[error("Artifact {uri} unavailable: {source}")]
    RemoteUnavailable {
        uri: String,
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for failures worth retrying at the job level.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Provider { status, .. } => *status >= 500 || *status == 429,
            Self::RemoteUnavailable { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}
