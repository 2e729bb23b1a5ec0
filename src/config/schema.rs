use crate::pubsub::TopicName;
use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
#[cfg(unix)]
use tokio::fs::File;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

const CONFIG_FILE_NAME: &str = "config.toml";
const SUPPORTED_SESSION_BACKENDS: &[&str] = &["in_memory", "vertex"];

// ── Top-level config ──────────────────────────────────────────────

/// Top-level fraudwatch configuration, loaded from `config.toml`.
///
/// Resolution order: `FRAUDWATCH_CONFIG_DIR` env → `~/.fraudwatch/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding config.toml - computed, not serialized
    #[serde(skip)]
    pub config_dir: PathBuf,
    /// Path to config.toml - computed, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Cloud project, location, staging bucket, credentials (`[project]`).
    #[serde(default)]
    pub project: ProjectConfig,

    /// Agent identity, model and target topics (`[agent]`).
    #[serde(default)]
    pub agent: AgentConfig,

    /// Session backend selection (`[sessions]`).
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Pub/Sub publisher settings (`[pubsub]`).
    #[serde(default)]
    pub pubsub: PubSubConfig,

    /// Deployment packaging inputs (`[deploy]`).
    #[serde(default)]
    pub deploy: DeployConfig,

    /// Transaction intake HTTP server (`[gateway]`).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Simulated transaction generator (`[generator]`).
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Logging defaults (`[observability]`).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ── Project ──────────────────────────────────────────────────────

/// Cloud project configuration (`[project]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Cloud project id. Overridden by `GOOGLE_CLOUD_PROJECT`.
    #[serde(default)]
    pub project_id: String,
    /// Region hosting the agent engine. Default: `"us-central1"`.
    #[serde(default = "default_location")]
    pub location: String,
    /// `gs://` bucket used to stage the deployment.
    #[serde(default)]
    pub staging_bucket: String,
    /// OAuth access token sent as a bearer token to all platform APIs.
    /// Overridden by `FRAUDWATCH_ACCESS_TOKEN` or `GOOGLE_OAUTH_ACCESS_TOKEN`.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Override for the platform API base URL (testing, private endpoints).
    #[serde(default)]
    pub api_base: Option<String>,
    /// Request timeout for platform API calls, in seconds.
    #[serde(default = "default_api_timeout_secs")]
    pub api_timeout_secs: u64,
}

fn default_location() -> String {
    "us-central1".into()
}

fn default_api_timeout_secs() -> u64 {
    120
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            location: default_location(),
            staging_bucket: String::new(),
            access_token: None,
            api_base: None,
            api_timeout_secs: default_api_timeout_secs(),
        }
    }
}

impl ProjectConfig {
    /// Base URL of the regional platform API.
    pub fn resolved_api_base(&self) -> String {
        match self.api_base.as_deref().map(str::trim) {
            Some(base) if !base.is_empty() => base.trim_end_matches('/').to_string(),
            _ => format!("https://{}-aiplatform.googleapis.com", self.location),
        }
    }

    /// `projects/{project}/locations/{location}`
    pub fn parent_resource(&self) -> String {
        format!("projects/{}/locations/{}", self.project_id, self.location)
    }
}

// ── Agent ────────────────────────────────────────────────────────

/// Agent definition inputs (`[agent]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// App name used to scope sessions. Default: `"FraudDetector"`.
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Model the hosted runtime should use. Default: `"gemini-2.5-flash"`.
    #[serde(default = "default_model")]
    pub model: String,
    /// Display name of the deployed engine.
    #[serde(default = "default_display_name")]
    pub display_name: String,
    /// Topic receiving every scored transaction (`projects/{p}/topics/{t}`).
    #[serde(default)]
    pub records_topic: String,
    /// Topic receiving high-risk alerts (`projects/{p}/topics/{t}`).
    #[serde(default)]
    pub alerts_topic: String,
    /// Fraud likelihood above which an alert is published. Default: `0.8`.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,
}

fn default_app_name() -> String {
    "FraudDetector".into()
}

fn default_model() -> String {
    "gemini-2.5-flash".into()
}

fn default_display_name() -> String {
    "Fraud Agent".into()
}

fn default_alert_threshold() -> f64 {
    0.8
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            model: default_model(),
            display_name: default_display_name(),
            records_topic: String::new(),
            alerts_topic: String::new(),
            alert_threshold: default_alert_threshold(),
        }
    }
}

// ── Sessions ─────────────────────────────────────────────────────

/// Session backend configuration (`[sessions]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// "in_memory" | "vertex"
    #[serde(default = "default_session_backend")]
    pub backend: String,
    /// Reasoning engine id hosting managed sessions. Required for "vertex".
    /// Overridden by `GOOGLE_CLOUD_AGENT_ENGINE_ID`.
    #[serde(default)]
    pub agent_engine_id: Option<String>,
    /// Serialize implicit session creation per session id.
    #[serde(default)]
    pub serialize_creation: bool,
}

fn default_session_backend() -> String {
    "in_memory".into()
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            backend: default_session_backend(),
            agent_engine_id: None,
            serialize_creation: false,
        }
    }
}

// ── Pub/Sub ──────────────────────────────────────────────────────

/// Pub/Sub publisher configuration (`[pubsub]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubSubConfig {
    /// REST endpoint. Default: `"https://pubsub.googleapis.com"`.
    #[serde(default = "default_pubsub_endpoint")]
    pub endpoint: String,
    /// Upper bound on waiting for a publish acknowledgement, in seconds.
    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,
}

fn default_pubsub_endpoint() -> String {
    "https://pubsub.googleapis.com".into()
}

fn default_publish_timeout_secs() -> u64 {
    60
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            endpoint: default_pubsub_endpoint(),
            publish_timeout_secs: default_publish_timeout_secs(),
        }
    }
}

// ── Deploy ───────────────────────────────────────────────────────

/// Deployment configuration (`[deploy]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// TOML manifest whose `project.dependencies` lists runtime requirements.
    /// Relative paths resolve against the config directory; `~` is expanded.
    #[serde(default = "default_requirements_manifest")]
    pub requirements_manifest: String,
    /// Extra package directories shipped with the deployment.
    #[serde(default = "default_extra_packages")]
    pub extra_packages: Vec<String>,
    /// Ask the platform to trace agent runs.
    #[serde(default = "default_true")]
    pub enable_tracing: bool,
}

fn default_requirements_manifest() -> String {
    "pyproject.toml".into()
}

fn default_extra_packages() -> Vec<String> {
    vec!["./agent".into()]
}

fn default_true() -> bool {
    true
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            requirements_manifest: default_requirements_manifest(),
            extra_packages: default_extra_packages(),
            enable_tracing: true,
        }
    }
}

// ── Gateway ──────────────────────────────────────────────────────

/// Transaction intake server (`[gateway]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Upper bound for one transaction round trip through the agent.
    #[serde(default = "default_gateway_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_gateway_max_body_bytes")]
    pub max_body_bytes: usize,
    /// When set, `POST /transactions` requires `Authorization: Bearer <token>`.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_request_timeout_secs() -> u64 {
    120
}

fn default_gateway_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            request_timeout_secs: default_gateway_request_timeout_secs(),
            max_body_bytes: default_gateway_max_body_bytes(),
            bearer_token: None,
        }
    }
}

// ── Generator ────────────────────────────────────────────────────

/// Simulated transaction feed (`[generator]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Topic receiving raw transactions (`projects/{p}/topics/{t}`).
    #[serde(default)]
    pub topic: String,
    /// Delay between published transactions.
    #[serde(default = "default_generator_interval_ms")]
    pub interval_ms: u64,
    /// Share of transactions generated as fraud.
    #[serde(default = "default_fraud_probability")]
    pub fraud_probability: f64,
    /// Number of distinct simulated cards.
    #[serde(default = "default_card_pool_size")]
    pub card_pool_size: usize,
}

fn default_generator_interval_ms() -> u64 {
    1000
}

fn default_fraud_probability() -> f64 {
    0.02
}

fn default_card_pool_size() -> usize {
    10_000
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            topic: String::new(),
            interval_ms: default_generator_interval_ms(),
            fraud_probability: default_fraud_probability(),
            card_pool_size: default_card_pool_size(),
        }
    }
}

// ── Observability ────────────────────────────────────────────────

/// Logging configuration (`[observability]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    "info".into()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

// ── Config impl ──────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());
        let config_dir = home.join(".fraudwatch");

        Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
            project: ProjectConfig::default(),
            agent: AgentConfig::default(),
            sessions: SessionsConfig::default(),
            pubsub: PubSubConfig::default(),
            deploy: DeployConfig::default(),
            gateway: GatewayConfig::default(),
            generator: GeneratorConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("FRAUDWATCH_CONFIG_DIR") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(shellexpand::tilde(dir.trim()).as_ref()));
        }
    }
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".fraudwatch"))
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub async fn load_or_init() -> Result<Self> {
        let config_dir = default_config_dir()?;
        let mut config = Self::load_or_init_in(&config_dir).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load `config.toml` from `config_dir`, writing a default one if absent.
    ///
    /// Env overrides are not applied here.
    pub async fn load_or_init_in(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        fs::create_dir_all(config_dir).await.with_context(|| {
            format!("Failed to create config directory: {}", config_dir.display())
        })?;

        if config_path.exists() {
            // Warn if config file is world-readable (may contain an access token)
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(meta) = fs::metadata(&config_path).await {
                    if meta.permissions().mode() & 0o004 != 0 {
                        tracing::warn!(
                            "Config file {:?} is world-readable (mode {:o}). \
                             Consider restricting with: chmod 600 {:?}",
                            config_path,
                            meta.permissions().mode() & 0o777,
                            config_path,
                        );
                    }
                }
            }

            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path;
            config.config_dir = config_dir.to_path_buf();
            tracing::info!(
                path = %config.config_path.display(),
                initialized = false,
                "Config loaded"
            );
            Ok(config)
        } else {
            let config = Config {
                config_path: config_path.clone(),
                config_dir: config_dir.to_path_buf(),
                ..Config::default()
            };
            config.save().await?;

            #[cfg(unix)]
            {
                use std::{fs::Permissions, os::unix::fs::PermissionsExt};
                let _ = fs::set_permissions(&config_path, Permissions::from_mode(0o600)).await;
            }

            tracing::info!(
                path = %config.config_path.display(),
                initialized = true,
                "Config loaded"
            );
            Ok(config)
        }
    }

    /// Validate configuration values that would cause runtime failures.
    pub fn validate(&self) -> Result<()> {
        if self.project.location.trim().is_empty() {
            anyhow::bail!("project.location must not be empty");
        }
        if self.project.api_timeout_secs == 0 {
            anyhow::bail!("project.api_timeout_secs must be greater than 0");
        }

        if self.agent.app_name.trim().is_empty() {
            anyhow::bail!("agent.app_name must not be empty");
        }
        if !(0.0..=1.0).contains(&self.agent.alert_threshold) {
            anyhow::bail!(
                "agent.alert_threshold must be between 0.0 and 1.0 (got {})",
                self.agent.alert_threshold
            );
        }
        for (field, topic) in [
            ("agent.records_topic", &self.agent.records_topic),
            ("agent.alerts_topic", &self.agent.alerts_topic),
            ("generator.topic", &self.generator.topic),
        ] {
            if !topic.is_empty() {
                TopicName::parse(topic).with_context(|| format!("{field} is invalid"))?;
            }
        }

        let backend = self.sessions.backend.trim();
        if !SUPPORTED_SESSION_BACKENDS.contains(&backend) {
            anyhow::bail!(
                "Unknown sessions.backend '{backend}'. Supported values: {}",
                SUPPORTED_SESSION_BACKENDS.join(", ")
            );
        }
        if backend == "vertex"
            && self
                .sessions
                .agent_engine_id
                .as_deref()
                .map_or(true, |id| id.trim().is_empty())
        {
            anyhow::bail!("sessions.agent_engine_id is required when sessions.backend = \"vertex\"");
        }

        if self.pubsub.publish_timeout_secs == 0 {
            anyhow::bail!("pubsub.publish_timeout_secs must be greater than 0");
        }

        if self.gateway.host.trim().is_empty() {
            anyhow::bail!("gateway.host must not be empty");
        }
        if self.gateway.request_timeout_secs == 0 {
            anyhow::bail!("gateway.request_timeout_secs must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.generator.fraud_probability) {
            anyhow::bail!("generator.fraud_probability must be between 0.0 and 1.0");
        }
        if self.generator.card_pool_size == 0 {
            anyhow::bail!("generator.card_pool_size must be greater than 0");
        }

        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        if let Some(project) = env_non_empty("GOOGLE_CLOUD_PROJECT") {
            self.project.project_id = project;
        }
        if let Some(location) = env_non_empty("GOOGLE_CLOUD_LOCATION") {
            self.project.location = location;
        }
        if let Some(bucket) = env_non_empty("FRAUDWATCH_STAGING_BUCKET") {
            self.project.staging_bucket = bucket;
        }

        // Access token: FRAUDWATCH_ACCESS_TOKEN or GOOGLE_OAUTH_ACCESS_TOKEN
        if let Some(token) = env_non_empty("FRAUDWATCH_ACCESS_TOKEN")
            .or_else(|| env_non_empty("GOOGLE_OAUTH_ACCESS_TOKEN"))
        {
            self.project.access_token = Some(token);
        }

        if let Some(engine) = env_non_empty("GOOGLE_CLOUD_AGENT_ENGINE_ID") {
            self.sessions.agent_engine_id = Some(engine);
        }

        if let Some(host) = env_non_empty("FRAUDWATCH_GATEWAY_HOST") {
            self.gateway.host = host;
        }
        if let Some(port_str) = env_non_empty("FRAUDWATCH_GATEWAY_PORT") {
            match port_str.parse::<u16>() {
                Ok(port) => self.gateway.port = port,
                Err(_) => tracing::warn!(
                    value = %port_str,
                    "Ignoring invalid FRAUDWATCH_GATEWAY_PORT"
                ),
            }
        }
    }

    /// Reasoning-engine resource name for managed sessions, if configured.
    pub fn agent_engine_resource(&self) -> Option<String> {
        let id = self.sessions.agent_engine_id.as_deref()?.trim();
        if id.is_empty() {
            return None;
        }
        if id.starts_with("projects/") {
            return Some(id.to_string());
        }
        Some(format!(
            "{}/reasoningEngines/{id}",
            self.project.parent_resource()
        ))
    }

    /// Requirements manifest path with `~` expanded and relative paths
    /// anchored at the config directory.
    pub fn requirements_manifest_path(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.deploy.requirements_manifest);
        let path = PathBuf::from(expanded.as_ref());
        if path.is_absolute() {
            path
        } else {
            self.config_dir.join(path)
        }
    }

    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;

        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or(CONFIG_FILE_NAME);
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .await
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .await
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }

        sync_directory(parent_dir).await
    }
}

async fn sync_directory(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = File::open(path)
            .await
            .with_context(|| format!("Failed to open directory for fsync: {}", path.display()))?;
        dir.sync_all()
            .await
            .with_context(|| format!("Failed to fsync directory metadata: {}", path.display()))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}
