//! Run status as reported by the orchestrator.

use serde::{Deserialize, Serialize};

/// Status of a pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Accepted but no status reported yet.
    #[default]
    Unknown,
    /// Waiting to be scheduled.
    Pending,
    /// At least one job is executing.
    Running,
    /// All jobs finished successfully.
    Succeeded,
    /// Skipped by the orchestrator.
    Skipped,
    /// A job failed.
    Failed,
    /// The orchestrator hit an internal error.
    Error,
    /// Termination requested.
    Terminating,
    /// Terminated before completion.
    Terminated,
}

impl RunStatus {
    /// Map the orchestrator's status string.
    pub fn from_api(status: &str) -> Self {
        match status {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" | "Completed" => Self::Succeeded,
            "Skipped" => Self::Skipped,
            "Failed" => Self::Failed,
            "Error" => Self::Error,
            "Terminating" => Self::Terminating,
            "Terminated" | "Canceled" | "Cancelled" => Self::Terminated,
            _ => Self::Unknown,
        }
    }

    /// Returns true if the run is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Skipped | Self::Failed | Self::Error | Self::Terminated
        )
    }

    /// Returns true if the run is still active (not terminal).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}
