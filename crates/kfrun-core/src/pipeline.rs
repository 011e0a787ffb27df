//! Pipeline definitions: parameters plus jobs.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{CompileError, Job};

/// A top-level pipeline parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name.
    pub name: String,

    /// Value used when the caller supplies none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl Parameter {
    /// A parameter the caller must supply.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    /// A parameter with a default value.
    pub fn with_default(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }
}

/// A pipeline: declared parameters and the jobs wired between them.
///
/// Jobs are kept in declaration order; [`crate::compile`] derives the
/// submission order from the data dependencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDef {
    /// Pipeline name.
    pub name: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// Top-level parameters.
    #[serde(default)]
    pub parameters: Vec<Parameter>,

    /// Jobs in declaration order.
    #[serde(default)]
    pub jobs: Vec<Job>,
}

impl PipelineDef {
    /// Create an empty pipeline.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            parameters: Vec::new(),
            jobs: Vec::new(),
        }
    }

    /// Builder method to set the description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Builder method to add a parameter.
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Builder method to add a job.
    pub fn with_job(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }

    /// Get a job by name.
    pub fn get_job(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Get a parameter by name.
    pub fn get_parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Load a pipeline definition from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CompileError> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
