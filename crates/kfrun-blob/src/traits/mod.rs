//! Blob storage capability traits.
//!
//! - [`BlobUpload`]: copy a local file to `bucket/key`
//! - [`BlobDownload`]: copy `bucket/key` to a local file
//!
//! The composite [`BlobStore`] is implemented for any type providing both.
//! Callers that only read artifacts should ask for [`BlobDownload`].

mod download;
mod upload;

pub use download::BlobDownload;
pub use upload::BlobUpload;
pub(crate) use upload::default_key;

use kfrun_core::BackendKind;

/// Identity shared by every backend.
pub trait BlobBackend: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;
}

/// Composite trait for full blob store functionality.
pub trait BlobStore: BlobUpload + BlobDownload {}

/// Blanket implementation for any type implementing both capabilities.
impl<T: BlobUpload + BlobDownload> BlobStore for T {}
