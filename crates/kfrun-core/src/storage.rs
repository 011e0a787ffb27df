//! Storage backend selector.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CompileError;

/// Which object store backs a pipeline's artifacts.
///
/// Parsed once from configuration; everything downstream matches on the
/// enum instead of comparing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Amazon S3 or an S3-compatible endpoint.
    S3,
    /// Google Cloud Storage.
    Gcs,
    /// Local filesystem directory (development and local mode).
    Local,
}

impl BackendKind {
    /// URI scheme used in artifact locations.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Gcs => "gs",
            Self::Local => "file",
        }
    }

    /// Resolve a URI scheme back to a backend.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "s3" => Some(Self::S3),
            "gs" => Some(Self::Gcs),
            "file" => Some(Self::Local),
            _ => None,
        }
    }

    /// Selector string accepted by [`FromStr`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Gcs => "gcs",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" | "aws" => Ok(Self::S3),
            "gcs" | "gs" | "gcp" => Ok(Self::Gcs),
            "local" | "file" => Ok(Self::Local),
            _ => Err(CompileError::UnknownBackend(s.to_string())),
        }
    }
}
