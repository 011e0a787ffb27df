//! Backend-agnostic blob storage for job artifacts.
//!
//! Jobs read and write artifacts through the [`BlobUpload`] and
//! [`BlobDownload`] capabilities without knowing which provider backs them.
//! The backend is chosen once, from [`StorageConfig`], by [`open_store`].
//!
//! Backends:
//! - [`S3Store`]: S3 and S3-compatible endpoints, SigV4 presigned requests
//! - [`GcsStore`]: Google Cloud Storage JSON API with a bearer token
//! - [`LocalStore`]: a directory on the local filesystem

pub mod config;
pub mod error;
pub mod gcs;
pub mod local;
pub mod resolve;
pub mod s3;
pub mod sigv4;
pub mod traits;
mod transfer;

pub use config::{open_store, StorageConfig};
pub use error::StorageError;
pub use gcs::GcsStore;
pub use local::LocalStore;
pub use resolve::{ensure_dir, ArtifactResolver, Resolution};
pub use s3::{S3Credentials, S3Store};
pub use traits::{BlobBackend, BlobDownload, BlobStore, BlobUpload};

pub use kfrun_core::{ArtifactLocation, BackendKind};
