//! kfrun Core Domain Types
//!
//! This crate contains the pure pipeline model with no dependencies on:
//! - Network/HTTP
//! - Cloud storage SDKs
//! - Runtime specifics
//!
//! A [`PipelineDef`] describes jobs and the artifacts flowing between them.
//! [`compile`] turns it into a [`CompiledGraph`] the orchestrator accepts.

pub mod archive;
pub mod artifact;
pub mod cache;
pub mod compile;
pub mod error;
pub mod ids;
pub mod job;
pub mod metrics;
pub mod pipeline;
pub mod run;
pub mod status;
pub mod storage;

// Re-export commonly used types
pub use artifact::{Artifact, ArtifactLocation, InputRef, OutputRef};
pub use cache::CacheDirective;
pub use compile::{compile, CompiledGraph, Edge, JobManifest, PipelineManifest, ResolvedInput, RuntimeConfig};
pub use error::CompileError;
pub use ids::{ExperimentId, RunId};
pub use job::{InputBinding, Job};
pub use metrics::{Metric, MetricFormat, MetricsManifest};
pub use pipeline::{Parameter, PipelineDef};
pub use run::PipelineRun;
pub use status::RunStatus;
pub use storage::BackendKind;
