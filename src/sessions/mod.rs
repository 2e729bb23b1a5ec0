//! Session management: conversation state stores and the implicit-creation proxy.

pub mod implicit;
pub mod in_memory;
pub mod traits;
pub mod vertex;

pub use implicit::ImplicitSessionStore;
pub use in_memory::InMemorySessionStore;
pub use traits::{
    GetSessionConfig, ListSessionsResponse, Session, SessionError, SessionEvent, SessionKey,
    SessionResult, SessionState, SessionStore,
};
pub use vertex::VertexSessionStore;

use crate::config::Config;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Build the configured backing store.
pub fn create_session_store(
    config: &Config,
    client: reqwest::Client,
) -> Result<Arc<dyn SessionStore>> {
    match config.sessions.backend.trim() {
        "in_memory" => Ok(Arc::new(InMemorySessionStore::new())),
        "vertex" => {
            let engine = config
                .agent_engine_resource()
                .context("sessions.agent_engine_id is required for the vertex backend")?;
            Ok(Arc::new(VertexSessionStore::new(
                client,
                &config.project.resolved_api_base(),
                &engine,
                config.project.access_token.clone(),
            )))
        }
        other => anyhow::bail!("Unknown sessions.backend '{other}'"),
    }
}

/// Build the configured store wrapped in the implicit-creation proxy.
pub fn create_session_service(
    config: &Config,
    client: reqwest::Client,
) -> Result<ImplicitSessionStore<Arc<dyn SessionStore>>> {
    let proxy = ImplicitSessionStore::new(create_session_store(config, client)?);
    Ok(if config.sessions.serialize_creation {
        proxy.with_serialized_creation()
    } else {
        proxy
    })
}
