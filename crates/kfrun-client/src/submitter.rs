//! Compile pipelines and submit them to the orchestrator.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kfrun_core::{compile, CompiledGraph, PipelineDef, PipelineRun, RunId, RuntimeConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument, Span};

use crate::auth::AuthSession;
use crate::config::{ClientConfig, Credentials};
use crate::error::ClientError;
use crate::orchestrator::OrchestratorClient;

/// Experiment runs land in when the caller names none.
pub const DEFAULT_EXPERIMENT: &str = "default";

/// Compiles pipelines and submits them under an [`AuthSession`].
///
/// Logs in lazily on first use. A session the orchestrator rejects is
/// renewed once per call; a second rejection is returned to the caller.
/// Submissions the orchestrator rejects for any other reason are never
/// retried.
pub struct PipelineSubmitter {
    config: ClientConfig,
    credentials: Credentials,
    session: Option<AuthSession>,
    span: Span,
}

impl PipelineSubmitter {
    /// Create a submitter. No network traffic until the first call.
    pub fn new(config: ClientConfig, credentials: Credentials) -> Self {
        let span = tracing::info_span!(
            "pipeline_submitter",
            endpoint = %config.base_url(),
            namespace = %config.namespace
        );
        Self {
            config,
            credentials,
            session: None,
            span,
        }
    }

    /// Builder method to reuse an existing session.
    pub fn with_session(mut self, session: AuthSession) -> Self {
        self.session = Some(session);
        self
    }

    /// Current session, if logged in.
    pub fn session(&self) -> Option<&AuthSession> {
        self.session.as_ref()
    }

    /// Compile `pipeline` into a submittable graph.
    pub fn compile(&self, pipeline: &PipelineDef, runtime: &RuntimeConfig) -> Result<CompiledGraph, ClientError> {
        let _guard = self.span.enter();
        let graph = compile(pipeline, runtime)?;
        info!(
            pipeline = %graph.name(),
            jobs = graph.manifest().jobs.len(),
            edges = graph.manifest().edges.len(),
            "Compiled pipeline"
        );
        Ok(graph)
    }

    /// Submit `graph` with `arguments`.
    ///
    /// Arguments are validated against the graph's parameters before any
    /// network call. `run_name` defaults to `<pipeline>-<YYYYmmddHHMMSS>`.
    pub async fn submit(
        &mut self,
        graph: &CompiledGraph,
        arguments: &BTreeMap<String, String>,
        experiment_name: &str,
        run_name: Option<&str>,
    ) -> Result<PipelineRun, ClientError> {
        self.submit_with_cancel(graph, arguments, experiment_name, run_name, &CancellationToken::new())
            .await
    }

    /// Submit, aborting when `cancel` fires.
    ///
    /// A cancelled call drops any session it was holding.
    pub async fn submit_with_cancel(
        &mut self,
        graph: &CompiledGraph,
        arguments: &BTreeMap<String, String>,
        experiment_name: &str,
        run_name: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<PipelineRun, ClientError> {
        let resolved = graph.resolve_arguments(arguments)?;
        let run_name = run_name
            .map(str::to_string)
            .unwrap_or_else(|| default_run_name(graph.name(), Utc::now()));
        let span = self.span.clone();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            result = self.submit_inner(graph, &resolved, experiment_name, &run_name).instrument(span) => result,
        };

        if matches!(result, Err(ClientError::Cancelled)) {
            warn!(parent: &self.span, run_name = %run_name, "Submission cancelled");
            self.session = None;
        }
        result
    }

    /// Fetch the current state of a run.
    pub async fn run_status(&mut self, id: &RunId) -> Result<PipelineRun, ClientError> {
        let client = self.client().await?;
        match client.get_run(id).await {
            Err(ClientError::SessionExpired) => {
                let client = self.renew().await?;
                client.get_run(id).await
            }
            other => other,
        }
    }

    async fn submit_inner(
        &mut self,
        graph: &CompiledGraph,
        arguments: &BTreeMap<String, String>,
        experiment_name: &str,
        run_name: &str,
    ) -> Result<PipelineRun, ClientError> {
        let client = self.client().await?;
        let run = match Self::create(&client, graph, arguments, experiment_name, run_name).await {
            Err(ClientError::SessionExpired) => {
                let client = self.renew().await?;
                Self::create(&client, graph, arguments, experiment_name, run_name).await?
            }
            other => other?,
        };

        info!(
            run_id = %run.id,
            run_name = %run_name,
            experiment = %experiment_name,
            "Pipeline submitted"
        );
        Ok(run)
    }

    async fn create(
        client: &OrchestratorClient,
        graph: &CompiledGraph,
        arguments: &BTreeMap<String, String>,
        experiment_name: &str,
        run_name: &str,
    ) -> Result<PipelineRun, ClientError> {
        let experiment_id = client.ensure_experiment(experiment_name).await?;
        let mut run = client
            .create_run(graph, arguments, &experiment_id, run_name)
            .await?;

        run.experiment_name = experiment_name.to_string();
        run.experiment_id.get_or_insert(experiment_id);
        if run.arguments.is_empty() {
            run.arguments = arguments.clone();
        }
        Ok(run)
    }

    /// Orchestrator client for the current session, logging in if needed.
    async fn client(&mut self) -> Result<OrchestratorClient, ClientError> {
        let session = match self.session.take() {
            Some(session) => session,
            None => AuthSession::login(&self.config, &self.credentials).await?,
        };
        let client = OrchestratorClient::new(&session)?;
        self.session = Some(session);
        Ok(client)
    }

    /// Drop the rejected session and log in again.
    async fn renew(&mut self) -> Result<OrchestratorClient, ClientError> {
        warn!("Session rejected, logging in again");
        self.session = None;
        self.client().await
    }
}

/// `<pipeline>-<YYYYmmddHHMMSS>`.
pub fn default_run_name(pipeline: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}", pipeline, now.format("%Y%m%d%H%M%S"))
}
