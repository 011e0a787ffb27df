//! Pipeline runs returned by the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{ExperimentId, RunId, RunStatus};

/// A pipeline run accepted by the orchestrator.
///
/// Owned by the caller for status queries; never mutated by submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Orchestrator-assigned run identifier.
    pub id: RunId,

    /// Experiment the run belongs to.
    pub experiment_name: String,

    /// Experiment identifier, when known.
    pub experiment_id: Option<ExperimentId>,

    /// Run name.
    pub run_name: String,

    /// Arguments the run was started with.
    pub arguments: BTreeMap<String, String>,

    /// Last reported status.
    pub status: RunStatus,

    /// When the orchestrator created the run.
    pub created_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Create a run record.
    pub fn new(id: RunId, experiment_name: impl Into<String>, run_name: impl Into<String>) -> Self {
        Self {
            id,
            experiment_name: experiment_name.into(),
            experiment_id: None,
            run_name: run_name.into(),
            arguments: BTreeMap::new(),
            status: RunStatus::Unknown,
            created_at: None,
        }
    }

    /// Builder method to set the arguments.
    pub fn with_arguments(mut self, arguments: BTreeMap<String, String>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Get an argument by name.
    pub fn argument(&self, name: &str) -> Option<&str> {
        self.arguments.get(name).map(String::as_str)
    }
}
