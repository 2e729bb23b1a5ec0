//! HTTP intake for transactions, plus health and metrics endpoints.
//!
//! `POST /transactions` accepts either a raw transaction JSON object or a
//! Pub/Sub push envelope and answers with the agent's response.

pub mod api;

use crate::config::GatewayConfig;
use crate::ingest::TransactionRouter;
use crate::observability::Metrics;
use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<TransactionRouter>,
    pub metrics: Arc<Metrics>,
    pub bearer_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(router: Arc<TransactionRouter>, metrics: Arc<Metrics>, config: &GatewayConfig) -> Self {
        Self {
            router,
            metrics,
            bearer_token: config
                .bearer_token
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(Arc::from),
        }
    }
}

/// Build the gateway router with body-size and timeout limits.
pub fn build_router(state: AppState, config: &GatewayConfig) -> Router {
    Router::new()
        .route("/transactions", post(api::handle_transaction))
        .route("/health", get(api::handle_health))
        .route("/metrics", get(api::handle_metrics))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn run_gateway(state: AppState, config: &GatewayConfig) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind gateway on {addr}"))?;
    let local = listener.local_addr().context("Gateway has no local address")?;
    tracing::info!(address = %local, "Gateway listening");

    axum::serve(listener, build_router(state, config))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Gateway shutting down");
        })
        .await
        .context("Gateway server error")
}
