//! Metrics manifest written by evaluation jobs.
//!
//! The orchestrator reads `{"metrics": [{"name", "numberValue", "format"}]}`
//! from a fixed file path; compiled jobs that declare a metrics output get
//! that path wired as a file output.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Output name the orchestrator looks for.
pub const METRICS_OUTPUT_NAME: &str = "mlpipeline-metrics";

/// Path inside the job container where the manifest must be written.
pub const METRICS_OUTPUT_PATH: &str = "/tmp/outputs/mlpipeline-metrics/data";

/// How the orchestrator renders a metric value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricFormat {
    #[default]
    Raw,
    Percentage,
}

/// A single named metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub name: String,
    pub number_value: f64,
    #[serde(default)]
    pub format: MetricFormat,
}

/// The metrics document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsManifest {
    pub metrics: Vec<Metric>,
}

impl MetricsManifest {
    /// Create an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to add a raw-format metric.
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.push(Metric {
            name: name.into(),
            number_value: value,
            format: MetricFormat::Raw,
        });
        self
    }

    /// Builder method to add a metric rendered as a percentage.
    pub fn with_percentage(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.push(Metric {
            name: name.into(),
            number_value: value,
            format: MetricFormat::Percentage,
        });
        self
    }

    /// Write the manifest as JSON, creating parent directories.
    pub fn write_to(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}
