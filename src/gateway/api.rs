//! Gateway handlers.

use super::AppState;
use crate::ingest::RouteError;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use base64::Engine as _;
use serde_json::{json, Value};

// ── Bearer token auth ───────────────────────────────────────────

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
}

fn require_auth(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = state.bearer_token.as_deref() else {
        return Ok(());
    };
    if extract_bearer_token(headers) == Some(expected) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized: send Authorization: Bearer <token>" })),
        )
            .into_response())
    }
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.into() })),
    )
        .into_response()
}

// ── Body decoding ───────────────────────────────────────────────

/// Raw transaction text from either a bare JSON body or a push envelope
/// (`{"message": {"data": "<base64>", ...}, "subscription": ...}`).
pub fn extract_transaction(body: &[u8]) -> Result<String, String> {
    let text = std::str::from_utf8(body).map_err(|_| "Body is not UTF-8".to_string())?;
    let parsed: Value =
        serde_json::from_str(text).map_err(|e| format!("Body is not valid JSON: {e}"))?;

    let Some(message) = parsed.get("message").filter(|m| m.is_object()) else {
        return Ok(text.to_string());
    };
    let data = message
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| "Push envelope has no message.data".to_string())?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| format!("message.data is not base64: {e}"))?;
    String::from_utf8(decoded).map_err(|_| "message.data is not UTF-8".to_string())
}

// ── Handlers ────────────────────────────────────────────────────

/// POST /transactions: score one transaction
pub async fn handle_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = require_auth(&state, &headers) {
        return e;
    }

    let raw = match extract_transaction(&body) {
        Ok(raw) => raw,
        Err(message) => {
            state.metrics.record_transaction(false);
            return bad_request(message);
        }
    };

    match state.router.handle(&raw).await {
        Ok(response) => {
            state.metrics.record_transaction(true);
            Json(json!({ "response": response })).into_response()
        }
        Err(RouteError::InvalidTransaction(message)) => {
            state.metrics.record_transaction(false);
            bad_request(message)
        }
        Err(e) => {
            state.metrics.record_transaction(false);
            tracing::error!(error_kind = "route_failed", "Transaction routing failed: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// GET /health
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /metrics: Prometheus text format
pub async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.metrics.render(),
    )
}
