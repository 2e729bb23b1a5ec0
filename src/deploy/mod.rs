//! Deployment driver: packages the agent definition with its runtime
//! requirements and session-service choice, and registers it remotely.

pub mod client;

pub use client::{AgentEngineClient, RemoteApp, VertexAgentEngineClient};

use crate::agent::AgentDefinition;
use crate::config::Config;
use crate::ingest::STREAM_QUERY_METHOD;
use crate::sessions::{self, ImplicitSessionStore, SessionStore};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Session service the hosted runtime should build for each app instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionServiceSpec {
    pub backend: String,
    pub agent_engine_id: Option<String>,
    /// Always true: every session service is wrapped in the implicit proxy.
    pub implicit: bool,
    pub serialize_creation: bool,
}

impl SessionServiceSpec {
    pub fn from_config(config: &Config) -> Self {
        Self {
            backend: config.sessions.backend.clone(),
            agent_engine_id: config.sessions.agent_engine_id.clone(),
            implicit: true,
            serialize_creation: config.sessions.serialize_creation,
        }
    }
}

/// Everything sent to the platform to register the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub display_name: String,
    pub description: String,
    pub agent: AgentDefinition,
    pub requirements: Vec<String>,
    pub extra_packages: Vec<String>,
    pub staging_bucket: String,
    /// Object prefix under the staging bucket for this deployment's artifacts.
    pub staging_prefix: String,
    pub session_service: SessionServiceSpec,
    pub enable_tracing: bool,
    pub class_methods: Vec<String>,
}

impl DeploymentRequest {
    pub fn build(config: &Config, agent: AgentDefinition, requirements: Vec<String>) -> Self {
        Self {
            display_name: config.agent.display_name.clone(),
            description: agent.description.clone(),
            agent,
            requirements,
            extra_packages: config.deploy.extra_packages.clone(),
            staging_bucket: config.project.staging_bucket.trim().to_string(),
            staging_prefix: format!(
                "fraudwatch/{}",
                chrono::Utc::now().format("%Y%m%dT%H%M%SZ")
            ),
            session_service: SessionServiceSpec::from_config(config),
            enable_tracing: config.deploy.enable_tracing,
            class_methods: vec![STREAM_QUERY_METHOD.to_string()],
        }
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    project: Option<ManifestProject>,
}

#[derive(Debug, Deserialize)]
struct ManifestProject {
    dependencies: Option<Vec<String>>,
}

/// Read `project.dependencies` from a TOML manifest.
pub async fn load_requirements(path: &Path) -> Result<Vec<String>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read requirements manifest {}", path.display()))?;
    let manifest: Manifest = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse requirements manifest {}", path.display()))?;
    manifest
        .project
        .and_then(|p| p.dependencies)
        .with_context(|| format!("{} has no project.dependencies", path.display()))
}

/// The session service factory the runtime invokes per app instance:
/// the configured backend wrapped in [`ImplicitSessionStore`].
pub fn session_service_builder(
    config: &Config,
    client: reqwest::Client,
) -> Result<ImplicitSessionStore<Arc<dyn SessionStore>>> {
    sessions::create_session_service(config, client)
}

/// Result of [`Deployer::deploy`].
#[derive(Debug, Clone)]
pub enum DeployOutcome {
    /// Dry run: the request that would have been sent.
    Planned(Box<DeploymentRequest>),
    Created(RemoteApp),
}

pub struct Deployer {
    config: Config,
    agent: AgentDefinition,
    client: Arc<dyn AgentEngineClient>,
}

impl Deployer {
    pub fn new(config: Config, agent: AgentDefinition, client: Arc<dyn AgentEngineClient>) -> Self {
        Self {
            config,
            agent,
            client,
        }
    }

    fn validate(&self) -> Result<()> {
        let project = &self.config.project;
        if project.project_id.trim().is_empty() {
            anyhow::bail!(
                "project.project_id is not set (configure it or export GOOGLE_CLOUD_PROJECT)"
            );
        }
        if !project.staging_bucket.trim().starts_with("gs://") {
            anyhow::bail!(
                "project.staging_bucket must be a gs:// URI (got '{}')",
                project.staging_bucket
            );
        }
        for (field, topic) in [
            ("agent.records_topic", &self.config.agent.records_topic),
            ("agent.alerts_topic", &self.config.agent.alerts_topic),
        ] {
            if topic.trim().is_empty() {
                anyhow::bail!("{field} must be set before deploying");
            }
        }
        Ok(())
    }

    /// Build the deployment request and, unless `dry_run`, register it.
    pub async fn deploy(&self, dry_run: bool) -> Result<DeployOutcome> {
        self.validate()?;

        let manifest = self.config.requirements_manifest_path();
        let requirements = load_requirements(&manifest).await?;
        tracing::info!(
            manifest = %manifest.display(),
            count = requirements.len(),
            "Loaded runtime requirements"
        );

        let request = DeploymentRequest::build(&self.config, self.agent.clone(), requirements);
        if dry_run {
            tracing::info!(display_name = %request.display_name, "Dry run: not deploying");
            return Ok(DeployOutcome::Planned(Box::new(request)));
        }

        let app = self
            .client
            .create(&request)
            .await
            .context("Agent deployment failed")?;
        tracing::info!(
            resource = %app.resource_name,
            client = self.client.name(),
            "Agent deployed"
        );
        Ok(DeployOutcome::Created(app))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::StreamQuery;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
[project]
name = "fraud-agent"
dependencies = ["google-adk>=1.0", "google-cloud-pubsub"]
"#;

    #[derive(Default)]
    struct RecordingClient {
        created: Mutex<Vec<DeploymentRequest>>,
    }

    #[async_trait]
    impl AgentEngineClient for RecordingClient {
        async fn create(&self, request: &DeploymentRequest) -> Result<RemoteApp> {
            self.created.lock().push(request.clone());
            Ok(RemoteApp {
                resource_name: "projects/acme/locations/us-central1/reasoningEngines/1".into(),
                display_name: request.display_name.clone(),
                operation: None,
            })
        }

        async fn stream_query(&self, _resource: &str, _query: &StreamQuery) -> Result<String> {
            anyhow::bail!("not used")
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn agent() -> AgentDefinition {
        AgentDefinition {
            name: "FraudDetector".into(),
            model: "gemini-2.5-flash".into(),
            description: "Determines risk of fraud in transactions.".into(),
            instruction: "score".into(),
            tools: Vec::new(),
        }
    }

    fn deployable_config(dir: &Path) -> Config {
        std::fs::write(dir.join("pyproject.toml"), MANIFEST).unwrap();
        let mut config = Config {
            config_dir: dir.to_path_buf(),
            config_path: dir.join("config.toml"),
            ..Config::default()
        };
        config.project.project_id = "acme".into();
        config.project.staging_bucket = "gs://acme-staging".into();
        config.agent.records_topic = "projects/acme/topics/scored".into();
        config.agent.alerts_topic = "projects/acme/topics/alerts".into();
        config
    }

    #[tokio::test]
    async fn load_requirements_reads_project_dependencies() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pyproject.toml");
        std::fs::write(&path, MANIFEST).unwrap();
        let deps = load_requirements(&path).await.unwrap();
        assert_eq!(deps, vec!["google-adk>=1.0", "google-cloud-pubsub"]);
    }

    #[tokio::test]
    async fn load_requirements_fails_without_dependencies() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pyproject.toml");
        std::fs::write(&path, "[project]\nname = \"x\"\n").unwrap();
        let err = load_requirements(&path).await.unwrap_err();
        assert!(err.to_string().contains("project.dependencies"));

        let missing = load_requirements(&tmp.path().join("nope.toml")).await;
        assert!(missing.is_err());
    }

    #[test]
    fn request_carries_session_spec_and_tracing() {
        let mut config = Config::default();
        config.sessions.backend = "vertex".into();
        config.sessions.agent_engine_id = Some("9".into());
        config.project.staging_bucket = " gs://b ".into();

        let request = DeploymentRequest::build(&config, agent(), vec!["a".into()]);
        assert_eq!(request.display_name, "Fraud Agent");
        assert_eq!(request.staging_bucket, "gs://b");
        assert!(request.enable_tracing);
        assert!(request.session_service.implicit);
        assert_eq!(request.session_service.backend, "vertex");
        assert_eq!(request.class_methods, vec!["async_stream_query"]);
        assert_eq!(request.extra_packages, vec!["./agent"]);
        assert!(request.staging_prefix.starts_with("fraudwatch/"));
    }

    #[tokio::test]
    async fn dry_run_plans_without_calling_platform() {
        let tmp = TempDir::new().unwrap();
        let client = Arc::new(RecordingClient::default());
        let deployer = Deployer::new(deployable_config(tmp.path()), agent(), client.clone());

        match deployer.deploy(true).await.unwrap() {
            DeployOutcome::Planned(request) => {
                assert_eq!(request.requirements.len(), 2);
                assert_eq!(request.agent.name, "FraudDetector");
            }
            DeployOutcome::Created(_) => panic!("dry run must not deploy"),
        }
        assert!(client.created.lock().is_empty());
    }

    #[tokio::test]
    async fn deploy_sends_request_to_client() {
        let tmp = TempDir::new().unwrap();
        let client = Arc::new(RecordingClient::default());
        let deployer = Deployer::new(deployable_config(tmp.path()), agent(), client.clone());

        let outcome = deployer.deploy(false).await.unwrap();
        let DeployOutcome::Created(app) = outcome else {
            panic!("expected a created app");
        };
        assert_eq!(app.engine_id(), "1");
        assert_eq!(client.created.lock().len(), 1);
    }

    #[tokio::test]
    async fn deploy_requires_project_and_bucket() {
        let tmp = TempDir::new().unwrap();
        let client: Arc<dyn AgentEngineClient> = Arc::new(RecordingClient::default());

        let mut config = deployable_config(tmp.path());
        config.project.project_id.clear();
        let err = Deployer::new(config, agent(), client.clone())
            .deploy(true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("project_id"));

        let mut config = deployable_config(tmp.path());
        config.project.staging_bucket = "acme-staging".into();
        let err = Deployer::new(config, agent(), client.clone())
            .deploy(true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("gs://"));

        let mut config = deployable_config(tmp.path());
        config.agent.alerts_topic.clear();
        let err = Deployer::new(config, agent(), client)
            .deploy(true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("agent.alerts_topic"));
    }

    #[tokio::test]
    async fn session_service_builder_wraps_backend() {
        let proxy = session_service_builder(&Config::default(), reqwest::Client::new()).unwrap();
        let session = proxy.get("FraudDetector", "4200", "4200").await.unwrap();
        assert_eq!(session.id, "4200");
    }
}
