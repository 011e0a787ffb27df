//! Built-in pipelines and pipeline loading.

use std::path::Path;

use kfrun_core::{CompileError, Job, Parameter, PipelineDef};

/// Name of the built-in training pipeline.
pub const TRAINING: &str = "training";

/// Load a built-in pipeline by name, or a pipeline definition from a JSON file.
pub fn load(source: &str) -> Result<PipelineDef, CompileError> {
    match source {
        TRAINING => Ok(training()),
        path => PipelineDef::from_json_file(Path::new(path)),
    }
}

/// prep -> train -> eval over a tabular dataset.
///
/// `prep` splits the raw data into train/test features and labels, `train`
/// fits a model on the training split and `eval` scores it on the test
/// split, writing a metrics manifest.
pub fn training() -> PipelineDef {
    PipelineDef::new(TRAINING)
        .with_description("Prepare data, train a classifier and evaluate it")
        .with_parameter(Parameter::required("raw_data"))
        .with_parameter(Parameter::required("bucket"))
        .with_parameter(Parameter::with_default("model_dir", "model/"))
        .with_job(
            Job::new("prep")
                .command(["python", "-m", "tasks", "prep-data"])
                .input_param("input_path", "raw_data")
                .input_param("bucket", "bucket")
                .output("xtrain_path")
                .output("xtest_path")
                .output("ytrain_path")
                .output("ytest_path"),
        )
        .with_job(
            Job::new("train")
                .command(["python", "-m", "tasks", "train"])
                .input_param("bucket", "bucket")
                .input_upstream("xtrain_path", "prep")
                .input_upstream("ytrain_path", "prep")
                .input_param("model_dir", "model_dir")
                .output("model_path"),
        )
        .with_job(
            Job::new("eval")
                .command(["python", "-m", "tasks", "eval"])
                .input_upstream("model_path", "train")
                .input_upstream("xtest_path", "prep")
                .input_upstream("ytest_path", "prep")
                .metrics_output(),
        )
}
