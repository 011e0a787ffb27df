//! Artifacts and the references that produce and consume them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{BackendKind, CompileError};

/// A job output, addressed by job name and output name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    /// Producing job.
    pub job: String,
    /// Output declared by that job.
    pub output: String,
}

impl OutputRef {
    /// Create a new OutputRef.
    pub fn new(job: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            output: output.into(),
        }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.job, self.output)
    }
}

/// A job input, addressed by job name and input parameter name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InputRef {
    /// Consuming job.
    pub job: String,
    /// Input parameter on that job.
    pub input: String,
}

impl InputRef {
    /// Create a new InputRef.
    pub fn new(job: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            input: input.into(),
        }
    }
}

impl fmt::Display for InputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.job, self.input)
    }
}

/// Opaque location of an artifact: backend, bucket and key.
///
/// Rendered as `<scheme>://<bucket>/<key>`, e.g. `s3://data/run-1/prep/train_path`.
/// Two artifacts are the same artifact iff their locations are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactLocation {
    /// Backend holding the object.
    pub backend: BackendKind,
    /// Bucket or container.
    pub bucket: String,
    /// Object key within the bucket.
    pub key: String,
}

impl ArtifactLocation {
    /// Create a location from its parts.
    pub fn new(backend: BackendKind, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            backend,
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Deterministic location for a job output under a run-scoped prefix.
    pub fn for_output(
        backend: BackendKind,
        bucket: &str,
        prefix: &str,
        job: &str,
        output: &str,
    ) -> Self {
        let prefix = prefix.trim_matches('/');
        let key = if prefix.is_empty() {
            format!("{job}/{output}")
        } else {
            format!("{prefix}/{job}/{output}")
        };
        Self::new(backend, bucket, key)
    }

    /// Parse `<scheme>://<bucket>/<key>`.
    pub fn parse(uri: &str) -> Result<Self, CompileError> {
        let invalid = || CompileError::InvalidLocation(uri.to_string());

        let (scheme, rest) = uri.split_once("://").ok_or_else(invalid)?;
        let backend = BackendKind::from_scheme(scheme).ok_or_else(invalid)?;
        let (bucket, key) = rest.split_once('/').ok_or_else(invalid)?;
        if bucket.is_empty() || key.is_empty() {
            return Err(invalid());
        }

        Ok(Self::new(backend, bucket, key))
    }

    /// Render as a URI.
    pub fn uri(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.backend.scheme(), self.bucket, self.key)
    }
}

impl FromStr for ArtifactLocation {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A named output of one job, consumed as input by zero or more others.
///
/// Immutable once created; identity is the location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Where the artifact lives.
    pub location: ArtifactLocation,
    /// The job output that writes it.
    pub producer: OutputRef,
    /// Job inputs that read it.
    pub consumers: Vec<InputRef>,
}

impl Artifact {
    /// Create an artifact with no consumers yet.
    pub fn new(location: ArtifactLocation, producer: OutputRef) -> Self {
        Self {
            location,
            producer,
            consumers: Vec::new(),
        }
    }

    /// Builder method to add a consumer.
    pub fn with_consumer(mut self, consumer: InputRef) -> Self {
        self.consumers.push(consumer);
        self
    }

    /// The artifact URI.
    pub fn uri(&self) -> String {
        self.location.uri()
    }
}
