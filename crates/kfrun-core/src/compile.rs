//! Pipeline compilation.
//!
//! Compilation is two passes over the declared jobs:
//!
//! 1. register every job's outputs, minting a deterministic artifact
//!    location for each under the run-scoped prefix;
//! 2. resolve every job's inputs to a literal, a pipeline parameter or a
//!    registered output, by name.
//!
//! The resolved dependencies are then ordered topologically. Anything that
//! does not resolve, and any cycle, fails here rather than on the
//! orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use crate::error::validate_name;
use crate::metrics::{METRICS_OUTPUT_NAME, METRICS_OUTPUT_PATH};
use crate::{
    Artifact, ArtifactLocation, BackendKind, CacheDirective, CompileError, InputBinding, InputRef,
    OutputRef, Parameter, PipelineDef,
};

/// Manifest schema version.
pub const API_VERSION: &str = "kfrun.dev/v1";

/// Manifest kind.
pub const KIND: &str = "Pipeline";

/// Settings that apply to a whole compilation rather than one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Storage backend selector (`s3`, `gcs`, `local`).
    pub backend: String,

    /// Bucket that holds every artifact of the run.
    pub bucket: String,

    /// Run-scoped key prefix for artifact locations.
    pub artifact_prefix: String,

    /// Image for jobs that do not name one.
    pub default_image: Option<String>,

    /// Image pull policy applied to every job.
    pub image_pull_policy: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            backend: "s3".to_string(),
            bucket: String::new(),
            artifact_prefix: String::new(),
            default_image: None,
            image_pull_policy: "Always".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Create a runtime config for a backend selector and bucket.
    pub fn new(backend: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    /// Builder method to set the artifact prefix.
    pub fn with_artifact_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.artifact_prefix = prefix.into();
        self
    }

    /// Builder method to set the default image.
    pub fn with_default_image(mut self, image: impl Into<String>) -> Self {
        self.default_image = Some(image.into());
        self
    }

    /// Builder method to set the image pull policy.
    pub fn with_image_pull_policy(mut self, policy: impl Into<String>) -> Self {
        self.image_pull_policy = policy.into();
        self
    }
}

/// Storage block of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    pub backend: BackendKind,
    pub bucket: String,
    pub prefix: String,
}

/// A job input after binding resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ResolvedInput {
    Literal { value: String },
    Parameter { name: String },
    Artifact { uri: String, producer: OutputRef },
}

/// One job in the compiled manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobManifest {
    pub name: String,
    pub image: String,
    pub image_pull_policy: String,
    pub command: Vec<String>,
    pub inputs: BTreeMap<String, ResolvedInput>,
    /// Output name to artifact URI.
    pub outputs: BTreeMap<String, String>,
    /// Output name to orchestrator-designated file path.
    pub file_outputs: BTreeMap<String, String>,
    pub dependencies: Vec<String>,
    pub max_cache_staleness: CacheDirective,
}

/// A data dependency: one output feeding one input.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub from: OutputRef,
    pub to: InputRef,
    pub artifact: String,
}

/// The orchestrator-facing document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineManifest {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub description: String,
    pub parameters: Vec<Parameter>,
    pub storage: StorageSpec,
    /// Jobs in submission order.
    pub jobs: Vec<JobManifest>,
    pub edges: Vec<Edge>,
}

/// A compiled, submittable pipeline graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledGraph {
    manifest: PipelineManifest,
}

impl CompiledGraph {
    /// Wrap an already validated manifest.
    pub fn from_manifest(manifest: PipelineManifest) -> Self {
        Self { manifest }
    }

    /// The manifest.
    pub fn manifest(&self) -> &PipelineManifest {
        &self.manifest
    }

    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Get a compiled job by name.
    pub fn job(&self, name: &str) -> Option<&JobManifest> {
        self.manifest.jobs.iter().find(|j| j.name == name)
    }

    /// Returns true if `from` feeds `to`.
    pub fn has_edge(&self, from: &OutputRef, to: &InputRef) -> bool {
        self.manifest
            .edges
            .iter()
            .any(|e| &e.from == from && &e.to == to)
    }

    /// Every output artifact with its consumers.
    pub fn artifacts(&self) -> Vec<Artifact> {
        let mut artifacts = Vec::new();
        for job in &self.manifest.jobs {
            for (output, uri) in &job.outputs {
                // Only manifests loaded with `from_json` can carry foreign URIs.
                let Ok(location) = ArtifactLocation::parse(uri) else {
                    continue;
                };
                let producer = OutputRef::new(&job.name, output);
                let artifact = self
                    .manifest
                    .edges
                    .iter()
                    .filter(|e| e.from == producer)
                    .fold(Artifact::new(location, producer.clone()), |a, e| {
                        a.with_consumer(e.to.clone())
                    });
                artifacts.push(artifact);
            }
        }
        artifacts
    }

    /// Merge supplied arguments with parameter defaults.
    ///
    /// Fails on arguments the pipeline does not declare and on parameters
    /// that have neither an argument nor a default.
    pub fn resolve_arguments(
        &self,
        arguments: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>, CompileError> {
        if let Some(unknown) = arguments
            .keys()
            .find(|name| !self.manifest.parameters.iter().any(|p| &p.name == *name))
        {
            return Err(CompileError::UnknownArgument(unknown.clone()));
        }

        let mut resolved = BTreeMap::new();
        for param in &self.manifest.parameters {
            let value = arguments
                .get(&param.name)
                .or(param.default.as_ref())
                .ok_or_else(|| CompileError::MissingArgument(param.name.clone()))?;
            resolved.insert(param.name.clone(), value.clone());
        }
        Ok(resolved)
    }

    /// Serialize the manifest as pretty JSON.
    pub fn to_json(&self) -> Result<String, CompileError> {
        Ok(serde_json::to_string_pretty(&self.manifest)?)
    }

    /// Parse a manifest from JSON.
    pub fn from_json(json: &str) -> Result<Self, CompileError> {
        Ok(Self::from_manifest(serde_json::from_str(json)?))
    }
}

/// Compile a pipeline into a submittable graph.
///
/// Deterministic: identical inputs give an identical manifest.
pub fn compile(pipeline: &PipelineDef, runtime: &RuntimeConfig) -> Result<CompiledGraph, CompileError> {
    let backend: BackendKind = runtime.backend.parse()?;
    validate_bucket(&runtime.bucket)?;

    let mut parameters = BTreeSet::new();
    for param in &pipeline.parameters {
        validate_name(&param.name)?;
        if !parameters.insert(param.name.as_str()) {
            return Err(CompileError::DuplicateParameter(param.name.clone()));
        }
    }

    // Pass 1: register outputs.
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut registry: BTreeMap<OutputRef, ArtifactLocation> = BTreeMap::new();
    for (i, job) in pipeline.jobs.iter().enumerate() {
        validate_name(&job.name)?;
        if index.insert(job.name.as_str(), i).is_some() {
            return Err(CompileError::DuplicateJob(job.name.clone()));
        }
        if job.metrics && job.outputs.contains(METRICS_OUTPUT_NAME) {
            return Err(CompileError::DuplicateOutput {
                job: job.name.clone(),
                output: METRICS_OUTPUT_NAME.to_string(),
            });
        }
        for output in &job.outputs {
            validate_name(output)?;
            let location = ArtifactLocation::for_output(
                backend,
                &runtime.bucket,
                &runtime.artifact_prefix,
                &job.name,
                output,
            );
            registry.insert(OutputRef::new(&job.name, output), location);
        }
    }

    // Pass 2: resolve inputs.
    let mut deps: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); pipeline.jobs.len()];
    let mut resolved: Vec<BTreeMap<String, ResolvedInput>> = Vec::with_capacity(pipeline.jobs.len());
    let mut edges = Vec::new();

    for (i, job) in pipeline.jobs.iter().enumerate() {
        let mut inputs = BTreeMap::new();
        for (input, binding) in &job.inputs {
            validate_name(input)?;
            let value = match binding {
                InputBinding::Literal(value) => ResolvedInput::Literal {
                    value: value.clone(),
                },
                InputBinding::Parameter(name) => {
                    if !parameters.contains(name.as_str()) {
                        return Err(CompileError::UnresolvedBinding {
                            job: job.name.clone(),
                            input: input.clone(),
                            reference: format!("parameter '{name}' is not declared"),
                        });
                    }
                    ResolvedInput::Parameter { name: name.clone() }
                }
                InputBinding::Output(producer) => {
                    let location = registry.get(producer).ok_or_else(|| {
                        CompileError::UnresolvedBinding {
                            job: job.name.clone(),
                            input: input.clone(),
                            reference: format!("output '{producer}' is not declared"),
                        }
                    })?;
                    if producer.job == job.name {
                        return Err(CompileError::Cycle {
                            jobs: vec![job.name.clone(), job.name.clone()],
                        });
                    }
                    deps[i].insert(index[producer.job.as_str()]);
                    edges.push(Edge {
                        from: producer.clone(),
                        to: InputRef::new(&job.name, input),
                        artifact: location.uri(),
                    });
                    ResolvedInput::Artifact {
                        uri: location.uri(),
                        producer: producer.clone(),
                    }
                }
            };
            inputs.insert(input.clone(), value);
        }
        resolved.push(inputs);
    }

    let order = topological_order(&deps).map_err(|remaining| CompileError::Cycle {
        jobs: remaining
            .into_iter()
            .map(|i| pipeline.jobs[i].name.clone())
            .collect(),
    })?;

    let mut jobs = Vec::with_capacity(order.len());
    for i in order {
        let job = &pipeline.jobs[i];
        let image = job
            .image
            .clone()
            .or_else(|| runtime.default_image.clone())
            .ok_or_else(|| CompileError::MissingImage(job.name.clone()))?;

        let outputs = job
            .outputs
            .iter()
            .map(|output| {
                let uri = registry[&OutputRef::new(&job.name, output)].uri();
                (output.clone(), uri)
            })
            .collect();

        let mut file_outputs = BTreeMap::new();
        if job.metrics {
            file_outputs.insert(
                METRICS_OUTPUT_NAME.to_string(),
                METRICS_OUTPUT_PATH.to_string(),
            );
        }

        let dependencies = deps[i]
            .iter()
            .map(|&d| pipeline.jobs[d].name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        jobs.push(JobManifest {
            name: job.name.clone(),
            image,
            image_pull_policy: runtime.image_pull_policy.clone(),
            command: job.command.clone(),
            inputs: std::mem::take(&mut resolved[i]),
            outputs,
            file_outputs,
            dependencies,
            max_cache_staleness: job.cache,
        });
    }

    edges.sort();

    debug!(
        pipeline = %pipeline.name,
        jobs = jobs.len(),
        edges = edges.len(),
        backend = %backend,
        "Compiled pipeline"
    );

    Ok(CompiledGraph {
        manifest: PipelineManifest {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            name: pipeline.name.clone(),
            description: pipeline.description.clone(),
            parameters: pipeline.parameters.clone(),
            storage: StorageSpec {
                backend,
                bucket: runtime.bucket.clone(),
                prefix: runtime.artifact_prefix.trim_matches('/').to_string(),
            },
            jobs,
            edges,
        },
    })
}

/// Kahn's algorithm over `deps[i]` = jobs that job `i` reads from.
///
/// Ready jobs are taken lowest declaration index first so the order is
/// stable. On a cycle, returns the jobs that could not be ordered.
/// A bucket must be one URI segment so locations parse back unchanged.
fn validate_bucket(bucket: &str) -> Result<(), CompileError> {
    if bucket.trim().is_empty() {
        return Err(CompileError::InvalidLocation(
            "bucket must not be empty".to_string(),
        ));
    }
    if bucket.contains(['/', ':']) || bucket.chars().any(char::is_whitespace) {
        return Err(CompileError::InvalidLocation(format!(
            "bucket '{bucket}' must not contain '/', ':' or whitespace"
        )));
    }
    Ok(())
}

fn topological_order(deps: &[BTreeSet<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let mut in_degree: Vec<usize> = deps.iter().map(BTreeSet::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); deps.len()];
    for (job, upstream) in deps.iter().enumerate() {
        for &u in upstream {
            dependents[u].push(job);
        }
    }

    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| i)
        .collect();

    let mut order = Vec::with_capacity(deps.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &dependents[next] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() != deps.len() {
        let remaining = (0..deps.len()).filter(|i| in_degree[*i] > 0).collect();
        return Err(remaining);
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Job;
    use std::time::Duration;

    fn runtime() -> RuntimeConfig {
        RuntimeConfig::new("s3", "bucket")
            .with_artifact_prefix("runs/r1")
            .with_default_image("registry/pipeline:v1")
    }

    fn prep_train() -> PipelineDef {
        PipelineDef::new("training")
            .with_parameter(Parameter::required("raw_data"))
            .with_job(
                Job::new("prep")
                    .input_param("raw_data", "raw_data")
                    .output("train_path"),
            )
            .with_job(
                Job::new("train")
                    .input_upstream("train_path", "prep")
                    .output("model_path"),
            )
    }

    #[test]
    fn test_compile_wires_outputs_to_inputs() {
        let graph = compile(&prep_train(), &runtime()).unwrap();

        assert!(graph.has_edge(
            &OutputRef::new("prep", "train_path"),
            &InputRef::new("train", "train_path")
        ));

        let train = graph.job("train").unwrap();
        assert_eq!(train.dependencies, vec!["prep".to_string()]);
        assert_eq!(
            train.inputs.get("train_path"),
            Some(&ResolvedInput::Artifact {
                uri: "s3://bucket/runs/r1/prep/train_path".to_string(),
                producer: OutputRef::new("prep", "train_path"),
            })
        );
        assert_eq!(
            train.outputs.get("model_path").map(String::as_str),
            Some("s3://bucket/runs/r1/train/model_path")
        );
    }

    #[test]
    fn test_each_output_gets_exactly_one_artifact() {
        let pipeline = prep_train().with_job(
            Job::new("eval")
                .input_upstream("train_path", "prep")
                .input_upstream("model_path", "train")
                .metrics_output(),
        );
        let graph = compile(&pipeline, &runtime()).unwrap();
        let artifacts = graph.artifacts();

        assert_eq!(artifacts.len(), 2);
        let uris: BTreeSet<_> = artifacts.iter().map(Artifact::uri).collect();
        assert_eq!(uris.len(), 2);

        let train_path = artifacts
            .iter()
            .find(|a| a.producer == OutputRef::new("prep", "train_path"))
            .unwrap();
        assert_eq!(
            train_path.consumers,
            vec![
                InputRef::new("eval", "train_path"),
                InputRef::new("train", "train_path")
            ]
        );
    }

    #[test]
    fn test_submission_order_follows_dependencies() {
        // Declared consumer-first; compiled producer-first.
        let pipeline = PipelineDef::new("reordered")
            .with_job(Job::new("train").input_upstream("data", "prep"))
            .with_job(Job::new("prep").output("data"));

        let graph = compile(&pipeline, &runtime()).unwrap();
        let names: Vec<_> = graph.manifest().jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["prep", "train"]);
    }

    #[test]
    fn test_cycle_rejected() {
        let pipeline = PipelineDef::new("cyclic")
            .with_job(Job::new("a").input_upstream("x", "b").output("y"))
            .with_job(Job::new("b").input_upstream("y", "a").output("x"))
            .with_job(Job::new("c"));

        let err = compile(&pipeline, &runtime()).unwrap_err();
        match err {
            CompileError::Cycle { jobs } => assert_eq!(jobs, vec!["a", "b"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_reference_rejected() {
        let pipeline = PipelineDef::new("self")
            .with_job(Job::new("a").input_upstream("x", "a").output("x"));
        assert!(matches!(
            compile(&pipeline, &runtime()),
            Err(CompileError::Cycle { .. })
        ));
    }

    #[test]
    fn test_unresolved_output_binding() {
        let pipeline = PipelineDef::new("p")
            .with_job(Job::new("prep").output("train_path"))
            .with_job(Job::new("train").input_from("x", "prep", "test_path"));

        let err = compile(&pipeline, &runtime()).unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnresolvedBinding { ref job, ref input, .. } if job == "train" && input == "x"
        ));
    }

    #[test]
    fn test_unresolved_parameter_binding() {
        let pipeline = PipelineDef::new("p").with_job(Job::new("prep").input_param("raw", "raw_data"));
        assert!(matches!(
            compile(&pipeline, &runtime()),
            Err(CompileError::UnresolvedBinding { .. })
        ));
    }

    #[test]
    fn test_unknown_backend_fails_before_anything_else() {
        let runtime = RuntimeConfig::new("azure", "bucket");
        // Also has an unresolved binding; the backend is reported first.
        let pipeline = PipelineDef::new("p").with_job(Job::new("a").input_upstream("x", "nope"));
        assert!(matches!(
            compile(&pipeline, &runtime),
            Err(CompileError::UnknownBackend(ref b)) if b == "azure"
        ));
    }

    #[test]
    fn test_duplicate_job() {
        let pipeline = PipelineDef::new("p")
            .with_job(Job::new("a"))
            .with_job(Job::new("a"));
        assert!(matches!(
            compile(&pipeline, &runtime()),
            Err(CompileError::DuplicateJob(_))
        ));
    }

    #[test]
    fn test_missing_image() {
        let runtime = RuntimeConfig::new("gcs", "bucket");
        let pipeline = PipelineDef::new("p").with_job(Job::new("a"));
        assert!(matches!(
            compile(&pipeline, &runtime),
            Err(CompileError::MissingImage(ref j)) if j == "a"
        ));
    }

    #[test]
    fn test_cache_directive_preserved() {
        let pipeline = PipelineDef::new("p")
            .with_job(Job::new("download").cache(CacheDirective::max_staleness(Duration::from_secs(3600))))
            .with_job(Job::new("train").cache(CacheDirective::never_reuse()));
        let graph = compile(&pipeline, &runtime()).unwrap();

        assert_eq!(
            graph.job("train").unwrap().max_cache_staleness,
            CacheDirective::never_reuse()
        );
        assert_eq!(
            graph.job("download").unwrap().max_cache_staleness.to_iso8601(),
            "PT1H"
        );

        let json: serde_json::Value = serde_json::from_str(&graph.to_json().unwrap()).unwrap();
        let train = json["jobs"]
            .as_array()
            .unwrap()
            .iter()
            .find(|j| j["name"] == "train")
            .unwrap();
        assert_eq!(train["maxCacheStaleness"], "P0D");
    }

    #[test]
    fn test_metrics_output_wired_to_designated_path() {
        let pipeline = PipelineDef::new("p").with_job(Job::new("eval").metrics_output());
        let graph = compile(&pipeline, &runtime()).unwrap();
        let eval = graph.job("eval").unwrap();
        assert_eq!(
            eval.file_outputs.get(METRICS_OUTPUT_NAME).map(String::as_str),
            Some(METRICS_OUTPUT_PATH)
        );
        assert!(eval.outputs.is_empty());
    }

    #[test]
    fn test_metrics_output_is_not_bindable() {
        let pipeline = PipelineDef::new("p")
            .with_job(Job::new("eval").metrics_output())
            .with_job(Job::new("report").input_from("m", "eval", METRICS_OUTPUT_NAME));
        assert!(matches!(
            compile(&pipeline, &runtime()),
            Err(CompileError::UnresolvedBinding { .. })
        ));
    }

    #[test]
    fn test_bucket_must_be_one_segment() {
        for bad in ["", "  ", "data/raw", "s3://data", "my bucket"] {
            let result = compile(&prep_train(), &RuntimeConfig::new("s3", bad).with_default_image("busybox"));
            assert!(
                matches!(result, Err(CompileError::InvalidLocation(_))),
                "accepted bucket {bad:?}"
            );
        }

        let graph = compile(&prep_train(), &RuntimeConfig::new("s3", "data-1.v2").with_default_image("busybox"))
            .unwrap();
        let produced: usize = graph.manifest().jobs.iter().map(|j| j.outputs.len()).sum();
        assert_eq!(graph.artifacts().len(), produced);
    }

    #[test]
    fn test_compile_is_deterministic() {
        let a = compile(&prep_train(), &runtime()).unwrap().to_json().unwrap();
        let b = compile(&prep_train(), &runtime()).unwrap().to_json().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_json_roundtrip() {
        let graph = compile(&prep_train(), &runtime()).unwrap();
        let back = CompiledGraph::from_json(&graph.to_json().unwrap()).unwrap();
        assert_eq!(graph, back);
    }

    #[test]
    fn test_resolve_arguments() {
        let pipeline = prep_train().with_parameter(Parameter::with_default("bucket", "data"));
        let graph = compile(&pipeline, &runtime()).unwrap();

        let mut args = BTreeMap::new();
        args.insert("raw_data".to_string(), "s3://bucket/in.tsv".to_string());
        let resolved = graph.resolve_arguments(&args).unwrap();
        assert_eq!(resolved["raw_data"], "s3://bucket/in.tsv");
        assert_eq!(resolved["bucket"], "data");

        assert!(matches!(
            graph.resolve_arguments(&BTreeMap::new()),
            Err(CompileError::MissingArgument(ref p)) if p == "raw_data"
        ));

        args.insert("extra".to_string(), "x".to_string());
        assert!(matches!(
            graph.resolve_arguments(&args),
            Err(CompileError::UnknownArgument(ref p)) if p == "extra"
        ));
    }
}
