//! Job descriptions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{CacheDirective, OutputRef};

/// Where a job input gets its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputBinding {
    /// A fixed value baked into the graph.
    Literal(String),
    /// A top-level pipeline argument, by parameter name.
    Parameter(String),
    /// An upstream job's output artifact.
    Output(OutputRef),
}

/// A remote batch job: container, inputs, outputs and cache policy.
///
/// A job is a pure description until submitted; it owns no runtime state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job name within the pipeline.
    pub name: String,

    /// Container image. Falls back to the runtime default image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Container command and arguments.
    #[serde(default)]
    pub command: Vec<String>,

    /// Input bindings keyed by parameter name.
    #[serde(default)]
    pub inputs: BTreeMap<String, InputBinding>,

    /// Declared artifact outputs.
    #[serde(default)]
    pub outputs: BTreeSet<String>,

    /// Whether the job writes a metrics manifest.
    #[serde(default)]
    pub metrics: bool,

    /// Cache staleness directive for this job.
    #[serde(default)]
    pub cache: CacheDirective,
}

impl Job {
    /// Create a new Job with no inputs or outputs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: None,
            command: Vec::new(),
            inputs: BTreeMap::new(),
            outputs: BTreeSet::new(),
            metrics: false,
            cache: CacheDirective::default(),
        }
    }

    /// Builder method to set the container image.
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Builder method to set the container command.
    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Bind an input to a literal value.
    pub fn input_literal(mut self, input: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs
            .insert(input.into(), InputBinding::Literal(value.into()));
        self
    }

    /// Bind an input to a pipeline parameter.
    pub fn input_param(mut self, input: impl Into<String>, parameter: impl Into<String>) -> Self {
        self.inputs
            .insert(input.into(), InputBinding::Parameter(parameter.into()));
        self
    }

    /// Bind an input to a named output of an upstream job.
    pub fn input_from(
        mut self,
        input: impl Into<String>,
        job: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        self.inputs
            .insert(input.into(), InputBinding::Output(OutputRef::new(job, output)));
        self
    }

    /// Bind an input to the upstream output with the same name.
    pub fn input_upstream(self, input: impl Into<String>, job: impl Into<String>) -> Self {
        let input = input.into();
        let output = input.clone();
        self.input_from(input, job, output)
    }

    /// Declare an artifact output.
    pub fn output(mut self, output: impl Into<String>) -> Self {
        self.outputs.insert(output.into());
        self
    }

    /// Declare that the job writes a metrics manifest.
    pub fn metrics_output(mut self) -> Self {
        self.metrics = true;
        self
    }

    /// Builder method to set the cache directive.
    pub fn cache(mut self, cache: CacheDirective) -> Self {
        self.cache = cache;
        self
    }

    /// Upstream jobs this job reads artifacts from.
    pub fn upstream_jobs(&self) -> BTreeSet<&str> {
        self.inputs
            .values()
            .filter_map(|binding| match binding {
                InputBinding::Output(r) => Some(r.job.as_str()),
                _ => None,
            })
            .collect()
    }
}
