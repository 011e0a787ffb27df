//! REST client for the orchestrator's v1beta1 API.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kfrun_core::{CompiledGraph, ExperimentId, PipelineRun, RunId, RunStatus};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn, Instrument, Span};

use crate::auth::AuthSession;
use crate::error::ClientError;

const RESOURCE_NAMESPACE: &str = "NAMESPACE";
const RESOURCE_EXPERIMENT: &str = "EXPERIMENT";
const RELATIONSHIP_OWNER: &str = "OWNER";

/// Authenticated client for experiments and runs.
pub struct OrchestratorClient {
    http: Client,
    base_url: String,
    namespace: String,
    span: Span,
}

impl OrchestratorClient {
    /// Create a client that sends `session`'s cookie.
    pub fn new(session: &AuthSession) -> Result<Self, ClientError> {
        Ok(Self {
            http: session.authenticated_client()?,
            base_url: session.config().pipeline_host(),
            namespace: session.namespace().to_string(),
            span: tracing::debug_span!(parent: session.span(), "orchestrator"),
        })
    }

    /// Find the experiment named `name` in the namespace, creating it if absent.
    pub async fn ensure_experiment(&self, name: &str) -> Result<ExperimentId, ClientError> {
        async {
            let filter = json!({
                "predicates": [{"op": "EQUALS", "key": "name", "stringValue": name}]
            })
            .to_string();
            let request = self.http.get(self.url("/apis/v1beta1/experiments")).query(&[
                ("filter", filter.as_str()),
                ("resource_reference_key.type", RESOURCE_NAMESPACE),
                ("resource_reference_key.id", self.namespace.as_str()),
            ]);

            let list: ListExperimentsResponse = self.send_json(request).await?;
            if let Some(existing) = list.experiments.into_iter().find(|e| e.name == name) {
                debug!(experiment = %name, id = %existing.id, "Using existing experiment");
                return Ok(ExperimentId::new(existing.id));
            }

            let body = json!({
                "name": name,
                "resource_references": [ResourceReference::new(
                    RESOURCE_NAMESPACE,
                    &self.namespace,
                )],
            });
            let created: ApiExperiment = self
                .send_json(self.http.post(self.url("/apis/v1beta1/experiments")).json(&body))
                .await?;
            info!(experiment = %name, id = %created.id, "Created experiment");
            Ok::<_, ClientError>(ExperimentId::new(created.id))
        }
        .instrument(self.span.clone())
        .await
    }

    /// Start a run of `graph` in an experiment.
    ///
    /// `arguments` must already be resolved against the graph's parameters.
    pub async fn create_run(
        &self,
        graph: &CompiledGraph,
        arguments: &BTreeMap<String, String>,
        experiment_id: &ExperimentId,
        run_name: &str,
    ) -> Result<PipelineRun, ClientError> {
        async {
            let parameters: Vec<ApiParameter> = arguments
                .iter()
                .map(|(name, value)| ApiParameter {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect();
            let body = json!({
                "name": run_name,
                "pipeline_spec": {
                    "workflow_manifest": graph.to_json()?,
                    "parameters": parameters,
                },
                "resource_references": [ResourceReference::new(
                    RESOURCE_EXPERIMENT,
                    experiment_id.as_str(),
                )],
            });

            debug!(run_name = %run_name, jobs = graph.manifest().jobs.len(), "Creating run");
            let detail: RunDetail = self
                .send_json(self.http.post(self.url("/apis/v1beta1/runs")).json(&body))
                .await?;
            let run = detail.run.into_pipeline_run();
            info!(run_id = %run.id, run_name = %run.run_name, "Run created");
            Ok::<_, ClientError>(run)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Fetch a run's current state.
    pub async fn get_run(&self, id: &RunId) -> Result<PipelineRun, ClientError> {
        let url = self.url(&format!("/apis/v1beta1/runs/{}", id.as_str()));
        let detail: RunDetail = self
            .send_json(self.http.get(url))
            .instrument(self.span.clone())
            .await?;
        Ok(detail.run.into_pipeline_run())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and decode a JSON body.
    ///
    /// 401, 403 and any redirect (a bounce to the login page) mean the
    /// session is no longer accepted.
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(&self.base_url, e))?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || status.is_redirection()
        {
            warn!(status = %status, url = %response.url(), "Session rejected");
            return Err(ClientError::SessionExpired);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ClientError::from_reqwest(&self.base_url, e))?;
        if !status.is_success() {
            return Err(ClientError::Submission {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ResourceKey {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResourceReference {
    key: ResourceKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    relationship: String,
}

impl ResourceReference {
    fn new(kind: &str, id: &str) -> Self {
        Self {
            key: ResourceKey {
                kind: kind.to_string(),
                id: id.to_string(),
            },
            name: None,
            relationship: RELATIONSHIP_OWNER.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiExperiment {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ListExperimentsResponse {
    #[serde(default)]
    experiments: Vec<ApiExperiment>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiParameter {
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiPipelineSpec {
    #[serde(default)]
    parameters: Vec<ApiParameter>,
}

#[derive(Debug, Deserialize)]
struct ApiRun {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pipeline_spec: ApiPipelineSpec,
    #[serde(default)]
    resource_references: Vec<ResourceReference>,
}

#[derive(Debug, Deserialize)]
struct RunDetail {
    run: ApiRun,
}

impl ApiRun {
    fn into_pipeline_run(self) -> PipelineRun {
        let experiment = self
            .resource_references
            .into_iter()
            .find(|r| r.key.kind == RESOURCE_EXPERIMENT);
        let arguments = self
            .pipeline_spec
            .parameters
            .into_iter()
            .map(|p| (p.name, p.value))
            .collect();

        let mut run = PipelineRun::new(
            RunId::new(self.id),
            experiment
                .as_ref()
                .and_then(|e| e.name.clone())
                .unwrap_or_default(),
            self.name,
        )
        .with_arguments(arguments);
        run.experiment_id = experiment.map(|e| ExperimentId::new(e.key.id));
        run.status = self
            .status
            .as_deref()
            .map(RunStatus::from_api)
            .unwrap_or_default();
        run.created_at = self.created_at;
        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_run_conversion() {
        let json = r#"{
            "run": {
                "id": "run-42",
                "name": "training-20240115120000",
                "status": "Running",
                "created_at": "2024-01-15T12:00:00Z",
                "pipeline_spec": {
                    "workflow_manifest": "{}",
                    "parameters": [{"name": "bucket", "value": "data"}]
                },
                "resource_references": [
                    {"key": {"type": "EXPERIMENT", "id": "exp-1"}, "name": "default", "relationship": "OWNER"}
                ]
            }
        }"#;
        let detail: RunDetail = serde_json::from_str(json).unwrap();
        let run = detail.run.into_pipeline_run();

        assert_eq!(run.id.as_str(), "run-42");
        assert_eq!(run.run_name, "training-20240115120000");
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.experiment_name, "default");
        assert_eq!(run.experiment_id, Some(ExperimentId::new("exp-1")));
        assert_eq!(run.argument("bucket"), Some("data"));
        assert!(run.created_at.is_some());
    }

    #[test]
    fn test_minimal_run() {
        let detail: RunDetail = serde_json::from_str(r#"{"run": {"id": "r"}}"#).unwrap();
        let run = detail.run.into_pipeline_run();
        assert_eq!(run.status, RunStatus::Unknown);
        assert!(run.arguments.is_empty());
        assert_eq!(run.experiment_id, None);
    }

    #[test]
    fn test_owner_reference_shape() {
        let value = serde_json::to_value(ResourceReference::new(RESOURCE_NAMESPACE, "ns")).unwrap();
        assert_eq!(
            value,
            json!({"key": {"type": "NAMESPACE", "id": "ns"}, "relationship": "OWNER"})
        );
    }
}
