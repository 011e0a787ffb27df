//! kfrun CLI - compile pipelines, submit them to a gated orchestrator and
//! move job artifacts in and out of blob storage.

mod pipelines;
mod prompt;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use kfrun_blob::{open_store, BlobDownload, BlobUpload, StorageConfig};
use kfrun_client::{AuthSession, ClientConfig, Credentials, PipelineSubmitter};
use kfrun_core::{CompiledGraph, Parameter, PipelineRun, RunId, RuntimeConfig};

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// kfrun - Pipeline submission for gated orchestrators
#[derive(Parser)]
#[command(name = "kfrun")]
#[command(about = "Compile and submit pipelines to a gated orchestrator", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a pipeline into an archive
    Compile {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Output archive path
        #[arg(short, long, default_value = "pipeline.tar.gz")]
        out: PathBuf,

        /// Print the manifest as JSON instead of writing an archive
        #[arg(long)]
        json: bool,
    },

    /// Compile and submit a pipeline run
    Submit {
        #[command(flatten)]
        gateway: GatewayArgs,

        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Pipeline argument as name=value (repeatable)
        #[arg(short = 'a', long = "arg", value_parser = parse_key_val)]
        args: Vec<(String, String)>,

        /// Value for the `raw_data` parameter
        #[arg(long, env = "KFRUN_RAW_DATA")]
        raw_data: Option<String>,

        /// Value for the `model_dir` parameter
        #[arg(long, env = "KFRUN_MODEL_DIR")]
        model_dir: Option<String>,

        /// Experiment to run in
        #[arg(short, long, default_value = kfrun_client::DEFAULT_EXPERIMENT)]
        experiment: String,

        /// Run name (default: <pipeline>-<timestamp>)
        #[arg(long)]
        run_name: Option<String>,
    },

    /// Show the status of a run
    #[command(name = "run-status")]
    RunStatus {
        #[command(flatten)]
        gateway: GatewayArgs,

        /// Run ID
        id: String,
    },

    /// Upload a local file to blob storage
    Upload {
        #[command(flatten)]
        storage: StorageArgs,

        /// Destination bucket
        bucket: String,

        /// Local file
        local: PathBuf,

        /// Object key (default: the file name)
        key: Option<String>,
    },

    /// Download an object from blob storage
    Download {
        #[command(flatten)]
        storage: StorageArgs,

        /// Source bucket
        bucket: String,

        /// Object key
        key: String,

        /// Local destination
        local: PathBuf,
    },

    /// Verify the login handshake
    Login {
        #[command(flatten)]
        gateway: GatewayArgs,
    },
}

/// Gateway and credential flags.
#[derive(Args)]
struct GatewayArgs {
    /// Gateway endpoint
    #[arg(long, env = "KFRUN_ENDPOINT", default_value = "http://localhost:8080")]
    endpoint: String,

    /// User namespace
    #[arg(short, long, env = "KFRUN_NAMESPACE", default_value = "kubeflow-user-example-com")]
    namespace: String,

    /// Login user (default: the OS user)
    #[arg(short, long, env = "KFRUN_USERNAME")]
    username: Option<String>,

    /// Login password (prompted for when absent)
    #[arg(long, env = "KFRUN_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,
}

/// Pipeline selection and compile settings.
#[derive(Args)]
struct PipelineArgs {
    /// Built-in pipeline name or path to a pipeline JSON file
    #[arg(short, long, default_value = pipelines::TRAINING)]
    pipeline: String,

    /// Artifact storage backend (s3, gcs, local)
    #[arg(long, env = "KFRUN_BACKEND", default_value = "s3")]
    backend: String,

    /// Artifact bucket
    #[arg(short, long, env = "KFRUN_BUCKET")]
    bucket: String,

    /// Key prefix for this run's artifacts
    #[arg(long, default_value = "")]
    artifact_prefix: String,

    /// Image for jobs that do not name one
    #[arg(long)]
    image: Option<String>,

    /// Image pull policy
    #[arg(long, default_value = "Always")]
    image_pull_policy: String,
}

/// Blob storage flags.
#[derive(Args)]
struct StorageArgs {
    /// Storage backend (s3, gcs, local)
    #[arg(long, env = "KFRUN_BACKEND", default_value = "s3")]
    backend: String,

    /// Endpoint override (S3-compatible stores, GCS emulators)
    #[arg(long, env = "KFRUN_STORAGE_ENDPOINT")]
    storage_endpoint: Option<String>,

    /// S3 region
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    region: String,

    /// Root directory for the local backend
    #[arg(long, default_value = ".kfrun/blobs")]
    local_root: PathBuf,
}

impl GatewayArgs {
    fn config(&self) -> ClientConfig {
        ClientConfig::new(self.endpoint.clone(), self.namespace.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }

    /// Credentials, prompting for the password when none was given.
    async fn credentials(&self) -> CliResult<Credentials> {
        let password = match &self.password {
            Some(password) => password.clone(),
            None => tokio::task::spawn_blocking(|| prompt::read_password("Password: ")).await??,
        };
        Ok(Credentials {
            username: self.username.clone(),
            password: Some(password),
        })
    }
}

impl PipelineArgs {
    fn runtime(&self) -> RuntimeConfig {
        let mut runtime = RuntimeConfig::new(self.backend.clone(), self.bucket.clone())
            .with_artifact_prefix(self.artifact_prefix.clone())
            .with_image_pull_policy(self.image_pull_policy.clone());
        if let Some(image) = &self.image {
            runtime = runtime.with_default_image(image.clone());
        }
        runtime
    }

    fn compile(&self) -> CliResult<CompiledGraph> {
        let pipeline = pipelines::load(&self.pipeline)?;
        Ok(kfrun_core::compile(&pipeline, &self.runtime())?)
    }
}

impl StorageArgs {
    fn config(&self) -> StorageConfig {
        StorageConfig {
            backend: self.backend.clone(),
            endpoint: self.storage_endpoint.clone(),
            region: self.region.clone(),
            local_root: self.local_root.clone(),
            ..StorageConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> CliResult {
    let cli = Cli::parse();

    let directive = if cli.verbose { "kfrun=debug" } else { "kfrun=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling");
            trigger.cancel();
        }
    });

    match cli.command {
        Commands::Compile {
            pipeline,
            out,
            json,
        } => {
            compile(&pipeline, &out, json)?;
        }
        Commands::Submit {
            gateway,
            pipeline,
            args,
            raw_data,
            model_dir,
            experiment,
            run_name,
        } => {
            let flags = [
                ("raw_data", raw_data),
                ("model_dir", model_dir),
                ("bucket", Some(pipeline.bucket.clone())),
            ];
            submit(
                &gateway,
                &pipeline,
                args.into_iter().collect(),
                flags,
                &experiment,
                run_name.as_deref(),
                &cancel,
            )
            .await?;
        }
        Commands::RunStatus { gateway, id } => {
            run_status(&gateway, id).await?;
        }
        Commands::Upload {
            storage,
            bucket,
            local,
            key,
        } => {
            upload(&storage, &bucket, &local, key.as_deref()).await?;
        }
        Commands::Download {
            storage,
            bucket,
            key,
            local,
        } => {
            download(&storage, &bucket, &key, &local).await?;
        }
        Commands::Login { gateway } => {
            login(&gateway, &cancel).await?;
        }
    }

    Ok(())
}

fn compile(pipeline: &PipelineArgs, out: &Path, json: bool) -> CliResult {
    let graph = pipeline.compile()?;

    if json {
        println!("{}", graph.to_json()?);
        return Ok(());
    }

    graph.write_archive(out)?;
    println!("Compiled '{}' to {}", graph.name(), out.display());
    println!("  Jobs:  {}", graph.manifest().jobs.len());
    println!("  Edges: {}", graph.manifest().edges.len());
    Ok(())
}

async fn submit(
    gateway: &GatewayArgs,
    pipeline: &PipelineArgs,
    mut arguments: BTreeMap<String, String>,
    flags: [(&str, Option<String>); 3],
    experiment: &str,
    run_name: Option<&str>,
    cancel: &CancellationToken,
) -> CliResult {
    let graph = pipeline.compile()?;
    fill_arguments(&mut arguments, &graph.manifest().parameters, flags);
    // Fail on bad arguments before prompting for a password.
    graph.resolve_arguments(&arguments)?;

    let mut submitter = PipelineSubmitter::new(gateway.config(), gateway.credentials().await?);
    let run = submitter
        .submit_with_cancel(&graph, &arguments, experiment, run_name, cancel)
        .await?;

    println!("Run submitted:");
    print_run(&run);
    Ok(())
}

async fn run_status(gateway: &GatewayArgs, id: String) -> CliResult {
    let mut submitter = PipelineSubmitter::new(gateway.config(), gateway.credentials().await?);
    let run = submitter.run_status(&RunId::new(id)).await?;
    print_run(&run);
    Ok(())
}

async fn upload(storage: &StorageArgs, bucket: &str, local: &Path, key: Option<&str>) -> CliResult {
    let store = open_store(&storage.config())?;
    let key = store.upload(bucket, local, key).await?;
    println!("Uploaded {} to {}/{}", local.display(), bucket, key);
    Ok(())
}

async fn download(storage: &StorageArgs, bucket: &str, key: &str, local: &Path) -> CliResult {
    let store = open_store(&storage.config())?;
    let bytes = store.download(bucket, key, local).await?;
    println!("Downloaded {}/{} to {} ({} bytes)", bucket, key, local.display(), bytes);
    Ok(())
}

async fn login(gateway: &GatewayArgs, cancel: &CancellationToken) -> CliResult {
    let config = gateway.config();
    let session = AuthSession::login_with_cancel(&config, &gateway.credentials().await?, cancel).await?;
    println!("Logged in to {} (namespace {})", session.endpoint(), session.namespace());
    Ok(())
}

/// Fill arguments the pipeline declares but the caller left unset from
/// dedicated flags.
fn fill_arguments<const N: usize>(
    arguments: &mut BTreeMap<String, String>,
    declared: &[Parameter],
    flags: [(&str, Option<String>); N],
) {
    for (name, value) in flags {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            continue;
        };
        if declared.iter().any(|p| p.name == name) {
            arguments.entry(name.to_string()).or_insert(value);
        }
    }
    debug!(arguments = ?arguments.keys().collect::<Vec<_>>(), "Resolved CLI arguments");
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty argument name in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn print_run(run: &PipelineRun) {
    println!("  ID:          {}", run.id);
    println!("  Name:        {}", run.run_name);
    println!("  Experiment:  {}", run.experiment_name);
    println!("  Status:      {:?}", run.status);
    if let Some(created) = run.created_at {
        println!("  Created:     {}", created.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if !run.arguments.is_empty() {
        println!("  Arguments:");
        for (name, value) in &run.arguments {
            println!("    {name} = {value}");
        }
    }
}
