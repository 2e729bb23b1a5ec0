#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::bool_to_int_with_if,
    clippy::case_sensitive_file_extension_comparisons,
    clippy::cast_possible_wrap,
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unused_self,
    clippy::cast_precision_loss,
    clippy::unnecessary_cast,
    clippy::unnecessary_lazy_evaluations,
    clippy::unnecessary_literal_bound,
    clippy::unnecessary_map_or,
    clippy::unnecessary_wraps,
    dead_code
)]

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use fraudwatch::agent::AgentDefinition;
use fraudwatch::config::Config;
use fraudwatch::deploy::{AgentEngineClient, DeployOutcome, Deployer, VertexAgentEngineClient};
use fraudwatch::gateway::{self, AppState};
use fraudwatch::generator::{self, GeneratorSettings, TransactionGenerator};
use fraudwatch::ingest::{RemoteAgentRuntime, TransactionRouter};
use fraudwatch::observability::Metrics;
use fraudwatch::sessions::{self, GetSessionConfig, SessionStore};
use fraudwatch::tools::{self, PublishRecordTool};
use fraudwatch::util::build_http_client;
use fraudwatch::{pubsub, SessionCommands};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    #[value(name = "bash")]
    Bash,
    #[value(name = "fish")]
    Fish,
    #[value(name = "zsh")]
    Zsh,
    #[value(name = "powershell")]
    PowerShell,
    #[value(name = "elvish")]
    Elvish,
}

/// `fraudwatch` - deploy and feed a fraud-scoring agent.
#[derive(Parser, Debug)]
#[command(name = "fraudwatch")]
#[command(version)]
#[command(about = "Fraud-detection agent with implicit sessions and a Pub/Sub publish tool.", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Package and register the fraud agent
    #[command(long_about = "\
Package and register the fraud agent.

Reads the requirements manifest, renders the agent definition from \
[agent], and registers it with the hosted agent runtime. The session \
service is always wrapped in the implicit session proxy.

Examples:
  fraudwatch deploy --dry-run   # print the request, send nothing
  fraudwatch deploy")]
    Deploy {
        /// Print the deployment request instead of sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// Send one transaction to the deployed agent
    #[command(long_about = "\
Send one transaction to the deployed agent.

The transaction's credit_card_number is used as both user id and \
session id, so repeated queries for one card share a session.

Examples:
  fraudwatch query -m '{\"credit_card_number\":\"4200123412341234\",\"amount\":12.5}'")]
    Query {
        /// Transaction JSON
        #[arg(short, long)]
        message: String,
    },

    /// Publish a JSON record through the publish_record tool
    Publish {
        /// Topic (projects/{project}/topics/{topic})
        #[arg(long)]
        topic: String,
        /// JSON payload
        #[arg(long)]
        payload: String,
    },

    /// Start the transaction gateway
    #[command(long_about = "\
Start the transaction gateway.

Serves POST /transactions (raw JSON or Pub/Sub push envelope), \
GET /health and GET /metrics. Bind address defaults to the values \
in your config file (gateway.host / gateway.port).

Examples:
  fraudwatch serve
  fraudwatch serve -p 9000 --host 0.0.0.0")]
    Serve {
        /// Port to listen on (use 0 for random available port); defaults to config gateway.port
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to; defaults to config gateway.host
        #[arg(long)]
        host: Option<String>,
    },

    /// Publish simulated transactions
    #[command(long_about = "\
Publish simulated credit card transactions.

Each card keeps a sticky home IP; a small share of transactions are \
generated as fraud with a large amount and a fresh IP. Messages are \
ordered by card number.

Examples:
  fraudwatch generate --count 100 --interval-ms 0
  fraudwatch generate --seed 7 --topic projects/acme/topics/raw")]
    Generate {
        /// Stop after this many transactions (default: run until interrupted)
        #[arg(long)]
        count: Option<u64>,
        /// Delay between transactions; defaults to config generator.interval_ms
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Seed for a reproducible sequence
        #[arg(long)]
        seed: Option<u64>,
        /// Topic; defaults to config generator.topic
        #[arg(long)]
        topic: Option<String>,
    },

    /// Inspect sessions through the implicit proxy
    Sessions {
        #[command(subcommand)]
        session_command: SessionCommands,
    },

    /// Show configuration status
    Status,

    /// Generate shell completion script to stdout
    #[command(long_about = "\
Generate shell completion scripts for `fraudwatch`.

The script is printed to stdout so it can be sourced directly:

Examples:
  source <(fraudwatch completions bash)
  fraudwatch completions zsh > ~/.zfunc/_fraudwatch")]
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Both ring and aws-lc-rs may be linked; pick one explicitly.
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("Warning: Failed to install default crypto provider: {e:?}");
    }

    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var("FRAUDWATCH_CONFIG_DIR", config_dir);
    }

    // Completions stay stdout-only: no config, no logging.
    if let Commands::Completions { shell } = &cli.command {
        let mut stdout = std::io::stdout().lock();
        write_shell_completion(*shell, &mut stdout)?;
        return Ok(());
    }

    let config = Config::load_or_init().await?;
    init_logging(&config.observability.log_filter)?;

    match cli.command {
        Commands::Completions { .. } => unreachable!(),
        Commands::Deploy { dry_run } => deploy(config, dry_run).await,
        Commands::Query { message } => query(&config, &message).await,
        Commands::Publish { topic, payload } => publish(&config, &topic, &payload).await,
        Commands::Serve { port, host } => serve(config, host, port).await,
        Commands::Generate {
            count,
            interval_ms,
            seed,
            topic,
        } => generate(&config, count, interval_ms, seed, topic).await,
        Commands::Sessions { session_command } => {
            handle_session_command(&config, session_command).await
        }
        Commands::Status => {
            print_status(&config);
            Ok(())
        }
    }
}

/// RUST_LOG wins; otherwise `observability.log_filter`.
fn init_logging(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt::Subscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")
}

fn http_client(config: &Config) -> reqwest::Client {
    build_http_client(config.project.api_timeout_secs)
}

fn engine_client(config: &Config) -> VertexAgentEngineClient {
    VertexAgentEngineClient::new(
        http_client(config),
        &config.project.resolved_api_base(),
        &config.project.parent_resource(),
        config.project.access_token.clone(),
    )
}

fn publish_tool(config: &Config, metrics: Arc<Metrics>) -> PublishRecordTool {
    let registry = pubsub::create_publisher_registry(config, http_client(config));
    PublishRecordTool::new(Arc::new(registry), metrics)
}

/// Router from the configured session service to the deployed engine.
fn transaction_router(config: &Config) -> Result<TransactionRouter> {
    let resource = config.agent_engine_resource().context(
        "sessions.agent_engine_id is required (set it or export GOOGLE_CLOUD_AGENT_ENGINE_ID)",
    )?;
    let client: Arc<dyn AgentEngineClient> = Arc::new(engine_client(config));
    let sessions = sessions::create_session_service(config, http_client(config))?;
    Ok(TransactionRouter::new(
        &config.agent.app_name,
        Arc::new(sessions),
        Arc::new(RemoteAgentRuntime::new(client, &resource)),
    ))
}

async fn deploy(config: Config, dry_run: bool) -> Result<()> {
    let metrics = Arc::new(Metrics::new());
    let registry = Arc::new(pubsub::create_publisher_registry(
        &config,
        http_client(&config),
    ));
    let agent_tools = tools::default_tools(registry, metrics);
    let agent = AgentDefinition::fraud_detector(&config.agent, &agent_tools);

    let client = Arc::new(engine_client(&config));
    match Deployer::new(config, agent, client).deploy(dry_run).await? {
        DeployOutcome::Planned(request) => {
            println!("{}", serde_json::to_string_pretty(&request)?);
        }
        DeployOutcome::Created(app) => {
            println!("Deployed {}", app.resource_name);
            println!("Engine id: {}", app.engine_id());
            println!("Set sessions.agent_engine_id = \"{}\" to query it.", app.engine_id());
        }
    }
    Ok(())
}

async fn query(config: &Config, message: &str) -> Result<()> {
    let router = transaction_router(config)?;
    let response = router.handle(message).await?;
    println!("{response}");
    Ok(())
}

async fn publish(config: &Config, topic: &str, payload: &str) -> Result<()> {
    let tool = publish_tool(config, Arc::new(Metrics::new()));
    let output = tool.publish_record(topic, payload).await;
    tool.registry().shutdown().await?;
    println!("{output}");
    Ok(())
}

async fn serve(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }
    if config.gateway.port == 0 {
        info!("Starting fraudwatch gateway on {} (random port)", config.gateway.host);
    } else {
        info!(
            "Starting fraudwatch gateway on {}:{}",
            config.gateway.host, config.gateway.port
        );
    }

    let router = Arc::new(transaction_router(&config)?);
    let state = AppState::new(router, Arc::new(Metrics::new()), &config.gateway);
    gateway::run_gateway(state, &config.gateway).await
}

async fn generate(
    config: &Config,
    count: Option<u64>,
    interval_ms: Option<u64>,
    seed: Option<u64>,
    topic: Option<String>,
) -> Result<()> {
    let topic = topic.unwrap_or_else(|| config.generator.topic.clone());
    if topic.trim().is_empty() {
        bail!("No topic given: pass --topic or set generator.topic");
    }

    let registry = pubsub::create_publisher_registry(config, http_client(config));
    let publisher = registry.acquire(&topic)?;
    let mut feed = TransactionGenerator::new(&GeneratorSettings::from_config(
        &config.generator,
        seed,
    ));
    let interval = Duration::from_millis(interval_ms.unwrap_or(config.generator.interval_ms));
    info!(topic = %publisher.topic(), ?count, "Generating transactions");

    let stats = tokio::select! {
        stats = generator::publish_transactions(&mut feed, publisher.as_ref(), count, interval) => stats?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            generator::GeneratorStats::default()
        }
    };
    registry.shutdown().await?;

    if count.is_some() {
        println!(
            "Published {} transactions ({} fraud, {} failed)",
            stats.published, stats.fraud, stats.failed
        );
    }
    Ok(())
}

async fn handle_session_command(config: &Config, command: SessionCommands) -> Result<()> {
    let proxy = sessions::create_session_service(config, http_client(config))?;
    let app = config.agent.app_name.as_str();
    let (user, session_id) = command.target();

    match (&command, session_id) {
        (SessionCommands::Get { recent, .. }, Some(session_id)) => {
            let filter = GetSessionConfig {
                num_recent_events: *recent,
                after_timestamp: None,
            };
            let session = proxy
                .get_with_config(app, user, session_id, Some(&filter))
                .await?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        (SessionCommands::List { .. }, _) => {
            let listed = proxy.list_sessions(app, user).await?;
            if listed.sessions.is_empty() {
                println!("No sessions for user {user}.");
            }
            for session in &listed.sessions {
                println!("{}  (updated {})", session.id, session.last_update_time);
            }
        }
        (SessionCommands::Delete { .. }, Some(session_id)) => {
            proxy.delete_session(app, user, session_id).await?;
            println!("Deleted session {session_id}.");
        }
        _ => unreachable!("get and delete always resolve a session id"),
    }
    Ok(())
}

fn print_status(config: &Config) {
    let or_unset = |value: &str| {
        if value.trim().is_empty() {
            "(unset)".to_string()
        } else {
            value.to_string()
        }
    };

    println!("fraudwatch status");
    println!();
    println!("Version:     {}", env!("CARGO_PKG_VERSION"));
    println!("Config:      {}", config.config_path.display());
    println!();
    println!("Project:          {}", or_unset(&config.project.project_id));
    println!("Location:         {}", config.project.location);
    println!("Staging bucket:   {}", or_unset(&config.project.staging_bucket));
    println!("API base:         {}", config.project.resolved_api_base());
    println!(
        "Access token:     {}",
        if config.project.access_token.is_some() { "set" } else { "(unset)" }
    );
    println!();
    println!("Agent:            {} ({})", config.agent.app_name, config.agent.model);
    println!("Records topic:    {}", or_unset(&config.agent.records_topic));
    println!("Alerts topic:     {}", or_unset(&config.agent.alerts_topic));
    println!("Alert threshold:  {}", config.agent.alert_threshold);
    println!();
    println!(
        "Sessions:         {} (serialized creation: {})",
        config.sessions.backend,
        if config.sessions.serialize_creation { "on" } else { "off" }
    );
    println!(
        "Agent engine:     {}",
        config
            .agent_engine_resource()
            .unwrap_or_else(|| "(not deployed)".to_string())
    );
    println!(
        "Gateway:          {}:{}",
        config.gateway.host, config.gateway.port
    );
    println!("Generator topic:  {}", or_unset(&config.generator.topic));
}

fn write_shell_completion<W: Write>(shell: CompletionShell, writer: &mut W) -> Result<()> {
    use clap_complete::generate;
    use clap_complete::shells;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin_name.clone(), writer),
        CompletionShell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, bin_name.clone(), writer);
        }
        CompletionShell::Elvish => generate(shells::Elvish, &mut cmd, bin_name, writer),
    }

    writer.flush()?;
    Ok(())
}
