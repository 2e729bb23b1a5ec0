//! Agent Engine REST client: staging, engine creation, and stream queries.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::DeploymentRequest;
use crate::ingest::StreamQuery;
use crate::util::sanitize_api_error;

const API_VERSION: &str = "v1beta1";
const DEFAULT_STORAGE_BASE: &str = "https://storage.googleapis.com";

/// A registered remote agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteApp {
    /// `projects/{p}/locations/{l}/reasoningEngines/{id}`
    pub resource_name: String,
    pub display_name: String,
    /// Long-running operation tracking the creation, when one was returned.
    pub operation: Option<String>,
}

impl RemoteApp {
    /// Trailing engine id of the resource name.
    pub fn engine_id(&self) -> &str {
        self.resource_name
            .rsplit('/')
            .next()
            .unwrap_or(self.resource_name.as_str())
    }
}

/// Control and data plane of the hosted agent runtime.
#[async_trait]
pub trait AgentEngineClient: Send + Sync {
    /// Stage artifacts and register a new engine.
    async fn create(&self, request: &DeploymentRequest) -> Result<RemoteApp>;

    /// Run one query against a deployed engine and return the final text.
    async fn stream_query(&self, resource: &str, query: &StreamQuery) -> Result<String>;

    fn name(&self) -> &str;
}

/// [`AgentEngineClient`] over the regional platform REST API.
pub struct VertexAgentEngineClient {
    client: reqwest::Client,
    api_base: String,
    storage_base: String,
    parent: String,
    access_token: Option<String>,
}

impl VertexAgentEngineClient {
    /// `parent` is `projects/{p}/locations/{l}`.
    pub fn new(
        client: reqwest::Client,
        api_base: &str,
        parent: &str,
        access_token: Option<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            storage_base: DEFAULT_STORAGE_BASE.to_string(),
            parent: parent.trim_matches('/').to_string(),
            access_token,
        }
    }

    pub fn with_storage_base(mut self, storage_base: &str) -> Self {
        self.storage_base = storage_base.trim_end_matches('/').to_string();
        self
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn check(what: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("{what} failed ({status}): {}", sanitize_api_error(&body))
    }

    /// Upload one object into the staging bucket; returns its `gs://` URI.
    async fn upload(&self, bucket: &str, object: &str, body: Vec<u8>) -> Result<String> {
        let url = format!("{}/upload/storage/v1/b/{bucket}/o", self.storage_base);
        let response = self
            .authorized(self.client.post(url))
            .query(&[("uploadType", "media"), ("name", object)])
            .header("Content-Type", "application/octet-stream")
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to upload gs://{bucket}/{object}"))?;
        Self::check("Staging upload", response).await?;
        Ok(format!("gs://{bucket}/{object}"))
    }

    async fn stage(&self, request: &DeploymentRequest) -> Result<StagedArtifacts> {
        let bucket = request
            .staging_bucket
            .strip_prefix("gs://")
            .context("staging bucket must start with gs://")?
            .trim_end_matches('/');
        let (bucket, prefix) = match bucket.split_once('/') {
            Some((b, p)) => (b, format!("{p}/{}", request.staging_prefix)),
            None => (bucket, request.staging_prefix.clone()),
        };

        let requirements = request.requirements.join("\n") + "\n";
        let requirements_uri = self
            .upload(bucket, &format!("{prefix}/requirements.txt"), requirements.into_bytes())
            .await?;

        let definition = serde_json::to_vec_pretty(request)
            .context("Failed to serialize deployment request")?;
        let definition_uri = self
            .upload(bucket, &format!("{prefix}/agent.json"), definition)
            .await?;

        Ok(StagedArtifacts {
            requirements_uri,
            definition_uri,
        })
    }

    fn create_body(request: &DeploymentRequest, staged: &StagedArtifacts) -> Value {
        json!({
            "displayName": request.display_name,
            "description": request.description,
            "spec": {
                "agentFramework": "google-adk",
                "packageSpec": {
                    "requirementsGcsUri": staged.requirements_uri,
                    "dependencyFilesGcsUri": staged.definition_uri,
                },
                "classMethods": request
                    .class_methods
                    .iter()
                    .map(|m| json!({ "name": m, "api_mode": "async_stream" }))
                    .collect::<Vec<_>>(),
            },
        })
    }
}

struct StagedArtifacts {
    requirements_uri: String,
    definition_uri: String,
}

#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
}

/// `projects/.../reasoningEngines/{id}/operations/{op}` → engine resource.
fn engine_from_operation(name: &str) -> Option<&str> {
    let (engine, _) = name.split_once("/operations/")?;
    engine.contains("/reasoningEngines/").then_some(engine)
}

/// Pick the final model text out of a newline-delimited event stream.
pub fn final_text(stream_body: &str) -> String {
    let mut last = None;
    for line in stream_body.lines() {
        let line = line.trim().trim_start_matches("data:").trim();
        if line.is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        let text: String = event["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if !text.is_empty() {
            last = Some(text);
        }
    }
    last.unwrap_or_else(|| stream_body.trim().to_string())
}

#[async_trait]
impl AgentEngineClient for VertexAgentEngineClient {
    async fn create(&self, request: &DeploymentRequest) -> Result<RemoteApp> {
        let staged = self.stage(request).await?;
        tracing::info!(
            requirements = %staged.requirements_uri,
            definition = %staged.definition_uri,
            "Deployment artifacts staged"
        );

        let url = format!("{}/{API_VERSION}/{}/reasoningEngines", self.api_base, self.parent);
        let response = self
            .authorized(self.client.post(url))
            .json(&Self::create_body(request, &staged))
            .send()
            .await
            .context("Failed to reach the agent engine API")?;
        let operation: Operation = Self::check("Engine creation", response)
            .await?
            .json()
            .await
            .context("Malformed engine creation response")?;

        let resource = engine_from_operation(&operation.name)
            .with_context(|| format!("Unexpected operation name: {}", operation.name))?;
        Ok(RemoteApp {
            resource_name: resource.to_string(),
            display_name: request.display_name.clone(),
            operation: Some(operation.name),
        })
    }

    async fn stream_query(&self, resource: &str, query: &StreamQuery) -> Result<String> {
        let url = format!(
            "{}/{API_VERSION}/{}:streamQuery",
            self.api_base,
            resource.trim_matches('/')
        );
        let response = self
            .authorized(self.client.post(url))
            .json(query)
            .send()
            .await
            .context("Failed to reach the agent engine API")?;
        let body = Self::check("Stream query", response)
            .await?
            .text()
            .await
            .context("Failed to read stream query response")?;
        Ok(final_text(&body))
    }

    fn name(&self) -> &str {
        "vertex"
    }
}
