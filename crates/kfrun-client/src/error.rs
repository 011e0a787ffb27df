//! Error types for the orchestrator client.

use kfrun_core::CompileError;
use thiserror::Error;

/// Errors from the login handshake and pipeline submission.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network failure talking to the gateway or orchestrator.
    #[error("connection to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The gateway answered with a server error.
    #[error("gateway {endpoint} unavailable: HTTP {status}")]
    GatewayUnavailable { endpoint: String, status: u16 },

    /// The handshake completed its HTTP exchange but the login token or
    /// session cookie was missing. The gateway's page shape or the
    /// credentials are likely wrong.
    #[error("authentication protocol error: {0}")]
    AuthProtocol(String),

    /// The orchestrator rejected the session cookie.
    #[error("session expired or rejected by the orchestrator")]
    SessionExpired,

    /// The orchestrator rejected the request.
    #[error("submission rejected: HTTP {status}: {body}")]
    Submission { status: u16, body: String },

    /// A request exceeded the configured timeout.
    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The graph or arguments failed validation.
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Local I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Endpoint URL could not be parsed.
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),
}

impl ClientError {
    /// Classify a reqwest error for `endpoint`.
    pub(crate) fn from_reqwest(endpoint: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                endpoint: endpoint.to_string(),
            }
        } else {
            Self::Transport {
                endpoint: endpoint.to_string(),
                source,
            }
        }
    }

    /// Returns true for failures worth retrying.
    ///
    /// Protocol and submission errors are deterministic and never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout { .. } | Self::GatewayUnavailable { .. }
        )
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
