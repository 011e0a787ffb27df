//! Compile-time errors.
//!
//! Everything here is a static property of the pipeline definition and is
//! raised before any network call is made.

use thiserror::Error;

/// Errors raised while validating or compiling a pipeline.
#[derive(Debug, Error)]
pub enum CompileError {
    /// An input binding names a parameter or upstream output that does not exist.
    #[error("Unresolved binding for input '{input}' of job '{job}': {reference}")]
    UnresolvedBinding {
        job: String,
        input: String,
        reference: String,
    },

    /// The job dependency graph contains a cycle.
    #[error("Dependency cycle between jobs: {}", jobs.join(" -> "))]
    Cycle { jobs: Vec<String> },

    /// Two jobs share a name.
    #[error("Duplicate job name: {0}")]
    DuplicateJob(String),

    /// A job declares the same output twice.
    #[error("Job '{job}' declares output '{output}' more than once")]
    DuplicateOutput { job: String, output: String },

    /// Two parameters share a name.
    #[error("Duplicate parameter name: {0}")]
    DuplicateParameter(String),

    /// Job, parameter or output name outside `[A-Za-z0-9_-]`.
    #[error("Invalid name '{0}': use letters, digits, '_' or '-'")]
    InvalidName(String),

    /// Storage backend selector outside the supported set.
    #[error("Unknown storage backend '{0}' (supported: s3, gcs, local)")]
    UnknownBackend(String),

    /// No image on the job and no default image in the runtime config.
    #[error("Job '{0}' has no container image")]
    MissingImage(String),

    /// A required pipeline argument was not supplied.
    #[error("Missing argument for parameter '{0}'")]
    MissingArgument(String),

    /// An argument was supplied for a parameter the pipeline does not declare.
    #[error("Unknown argument '{0}'")]
    UnknownArgument(String),

    /// Malformed cache staleness duration.
    #[error("Invalid cache staleness '{0}': expected an ISO-8601 duration like P0D or PT1H")]
    InvalidCacheDirective(String),

    /// Malformed artifact URI.
    #[error("Invalid artifact location: {0}")]
    InvalidLocation(String),

    /// Reading or writing the graph archive failed.
    #[error("Archive error: {0}")]
    Archive(#[from] std::io::Error),

    /// Manifest (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Check a job, output or parameter name.
pub(crate) fn validate_name(name: &str) -> Result<(), CompileError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(CompileError::InvalidName(name.to_string()))
    }
}
