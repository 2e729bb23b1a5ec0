//! Transaction ingest: turns raw transaction JSON into agent queries keyed by
//! card number, and routes them through the implicit session proxy.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::deploy::AgentEngineClient;
use crate::pubsub::PubsubMessage;
use crate::sessions::{ImplicitSessionStore, SessionError, SessionEvent, SessionStore};

pub const STREAM_QUERY_METHOD: &str = "async_stream_query";
const CARD_FIELD: &str = "credit_card_number";

/// Input of one stream query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamQueryInput {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub message: String,
}

/// Body of a `:streamQuery` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamQuery {
    pub class_method: String,
    pub input: StreamQueryInput,
}

impl StreamQuery {
    pub fn new(user_id: &str, session_id: Option<&str>, message: &str) -> Self {
        Self {
            class_method: STREAM_QUERY_METHOD.to_string(),
            input: StreamQueryInput {
                user_id: user_id.to_string(),
                session_id: session_id.map(str::to_string),
                message: message.to_string(),
            },
        }
    }

    /// Query for one raw transaction: the card number is the user id and the
    /// original text is the message.
    pub fn from_transaction(data: &str) -> Result<Self> {
        let card = card_number(data)?;
        Ok(Self::new(&card, None, data))
    }
}

/// Extract the card number from transaction JSON.
///
/// Strings and integers are accepted; anything else, or an empty value, is an error.
pub fn card_number(data: &str) -> Result<String> {
    let parsed: Value = serde_json::from_str(data).context("Transaction is not valid JSON")?;
    let card = match parsed.get(CARD_FIELD) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) if n.is_u64() => n.to_string(),
        _ => String::new(),
    };
    if card.is_empty() {
        anyhow::bail!("Field '{CARD_FIELD}' not found in message data.");
    }
    Ok(card)
}

/// Rewrite a transaction message into a stream-query message, keeping
/// attributes and ordering key.
pub fn convert_message(message: &PubsubMessage) -> Result<PubsubMessage> {
    let data = std::str::from_utf8(&message.data).context("Message data is not UTF-8")?;
    let query = StreamQuery::from_transaction(data)?;
    Ok(PubsubMessage {
        data: serde_json::to_vec(&query).context("Failed to encode stream query")?,
        attributes: message.attributes.clone(),
        ordering_key: message.ordering_key.clone(),
    })
}

/// Runs one agent turn for a user session.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn stream_query(&self, user_id: &str, session_id: &str, message: &str)
        -> Result<String>;

    fn name(&self) -> &str;
}

/// [`AgentRuntime`] backed by a deployed engine.
pub struct RemoteAgentRuntime {
    client: Arc<dyn AgentEngineClient>,
    resource: String,
}

impl RemoteAgentRuntime {
    pub fn new(client: Arc<dyn AgentEngineClient>, resource: &str) -> Self {
        Self {
            client,
            resource: resource.to_string(),
        }
    }
}

#[async_trait]
impl AgentRuntime for RemoteAgentRuntime {
    async fn stream_query(
        &self,
        user_id: &str,
        session_id: &str,
        message: &str,
    ) -> Result<String> {
        let query = StreamQuery::new(user_id, Some(session_id), message);
        self.client.stream_query(&self.resource, &query).await
    }

    fn name(&self) -> &str {
        "remote"
    }
}

/// Why a transaction could not be answered.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("agent runtime failed: {0:#}")]
    Runtime(anyhow::Error),
}

/// Sends each transaction to the agent under the card's session.
pub struct TransactionRouter {
    app_name: String,
    sessions: Arc<ImplicitSessionStore<Arc<dyn SessionStore>>>,
    runtime: Arc<dyn AgentRuntime>,
}

impl TransactionRouter {
    pub fn new(
        app_name: &str,
        sessions: Arc<ImplicitSessionStore<Arc<dyn SessionStore>>>,
        runtime: Arc<dyn AgentRuntime>,
    ) -> Self {
        Self {
            app_name: app_name.to_string(),
            sessions,
            runtime,
        }
    }

    pub fn sessions(&self) -> &Arc<ImplicitSessionStore<Arc<dyn SessionStore>>> {
        &self.sessions
    }

    /// Route one raw transaction and return the agent's answer.
    pub async fn handle(&self, raw: &str) -> Result<String, RouteError> {
        let card = card_number(raw).map_err(|e| RouteError::InvalidTransaction(e.to_string()))?;

        let session = self.sessions.get(&self.app_name, &card, &card).await?;
        tracing::debug!(
            session_id = %session.id,
            runtime = self.runtime.name(),
            "routing transaction"
        );

        let response = self
            .runtime
            .stream_query(&card, &session.id, raw)
            .await
            .map_err(RouteError::Runtime)?;

        for (author, content) in [("user", raw), ("agent", response.as_str())] {
            let event = SessionEvent {
                id: uuid::Uuid::new_v4().to_string(),
                author: author.to_string(),
                content: content.to_string(),
                timestamp: Utc::now(),
            };
            if let Err(e) = self.sessions.append_event(&session, event).await {
                tracing::warn!(session_id = %session.id, "Failed to record session event: {e}");
            }
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::InMemorySessionStore;
    use parking_lot::Mutex;

    const TX: &str = r#"{"credit_card_number": "4200123412341234", "receiver": "Macy's", "amount": 100.05, "ip_address": "68.45.25.58", "timestamp": "2025-09-18T11:47:02.814"}"#;

    #[derive(Default)]
    struct ScriptedRuntime {
        calls: Mutex<Vec<(String, String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl AgentRuntime for ScriptedRuntime {
        async fn stream_query(
            &self,
            user_id: &str,
            session_id: &str,
            message: &str,
        ) -> Result<String> {
            if self.fail {
                anyhow::bail!("model overloaded");
            }
            self.calls
                .lock()
                .push((user_id.into(), session_id.into(), message.into()));
            Ok(r#"{"fraud_likelihood": 0.1}"#.to_string())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn router(runtime: Arc<ScriptedRuntime>) -> TransactionRouter {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        TransactionRouter::new(
            "FraudDetector",
            Arc::new(ImplicitSessionStore::new(store)),
            runtime,
        )
    }

    #[test]
    fn from_transaction_builds_stream_query() {
        let query = StreamQuery::from_transaction(TX).unwrap();
        assert_eq!(query.class_method, "async_stream_query");
        assert_eq!(query.input.user_id, "4200123412341234");
        assert_eq!(query.input.message, TX);
        assert_eq!(query.input.session_id, None);

        let json = serde_json::to_value(&query).unwrap();
        assert!(json["input"].get("session_id").is_none());
    }

    #[test]
    fn missing_or_empty_card_is_rejected() {
        for bad in [
            r#"{"amount": 1}"#,
            r#"{"credit_card_number": ""}"#,
            r#"{"credit_card_number": null}"#,
        ] {
            let err = StreamQuery::from_transaction(bad).unwrap_err();
            assert!(err.to_string().contains("credit_card_number"), "{bad}");
        }
        assert!(StreamQuery::from_transaction("not json").is_err());
    }

    #[test]
    fn numeric_card_is_accepted() {
        assert_eq!(
            card_number(r#"{"credit_card_number": 4200123412341234}"#).unwrap(),
            "4200123412341234"
        );
    }

    #[test]
    fn convert_message_keeps_attributes() {
        let message = PubsubMessage::new(TX)
            .with_attribute("origin", "generator")
            .with_ordering_key("4200123412341234");
        let converted = convert_message(&message).unwrap();

        let body: Value = serde_json::from_slice(&converted.data).unwrap();
        assert_eq!(body["class_method"], "async_stream_query");
        assert_eq!(body["input"]["user_id"], "4200123412341234");
        assert_eq!(body["input"]["message"], TX);
        assert_eq!(converted.attributes["origin"], "generator");
        assert_eq!(converted.ordering_key.as_deref(), Some("4200123412341234"));
    }

    #[tokio::test]
    async fn router_uses_card_as_user_and_session() {
        let runtime = Arc::new(ScriptedRuntime::default());
        let router = router(Arc::clone(&runtime));

        let answer = router.handle(TX).await.unwrap();
        assert_eq!(answer, r#"{"fraud_likelihood": 0.1}"#);

        let calls = runtime.calls.lock();
        assert_eq!(calls[0].0, "4200123412341234");
        assert_eq!(calls[0].1, "4200123412341234");
        assert_eq!(calls[0].2, TX);
    }

    #[tokio::test]
    async fn repeated_transactions_share_one_session_with_history() {
        let runtime = Arc::new(ScriptedRuntime::default());
        let router = router(runtime);

        router.handle(TX).await.unwrap();
        router.handle(TX).await.unwrap();

        let listed = router
            .sessions()
            .list_sessions("FraudDetector", "4200123412341234")
            .await
            .unwrap();
        assert_eq!(listed.sessions.len(), 1);

        let session = router
            .sessions()
            .get("FraudDetector", "4200123412341234", "4200123412341234")
            .await
            .unwrap();
        let authors: Vec<&str> = session.events.iter().map(|e| e.author.as_str()).collect();
        assert_eq!(authors, vec!["user", "agent", "user", "agent"]);
    }

    #[tokio::test]
    async fn invalid_transaction_never_touches_sessions() {
        let runtime = Arc::new(ScriptedRuntime::default());
        let router = router(Arc::clone(&runtime));

        let err = router.handle(r#"{"amount": 5}"#).await.unwrap_err();
        assert!(matches!(err, RouteError::InvalidTransaction(_)));
        assert!(runtime.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn runtime_failure_is_reported() {
        let runtime = Arc::new(ScriptedRuntime {
            fail: true,
            ..ScriptedRuntime::default()
        });
        let err = router(runtime).handle(TX).await.unwrap_err();
        match err {
            RouteError::Runtime(e) => assert!(e.to_string().contains("model overloaded")),
            other => panic!("unexpected error: {other}"),
        }
    }

    struct EchoEngine {
        seen: Mutex<Vec<(String, StreamQuery)>>,
    }

    #[async_trait]
    impl AgentEngineClient for EchoEngine {
        async fn create(
            &self,
            _request: &crate::deploy::DeploymentRequest,
        ) -> Result<crate::deploy::RemoteApp> {
            anyhow::bail!("not used")
        }

        async fn stream_query(&self, resource: &str, query: &StreamQuery) -> Result<String> {
            self.seen.lock().push((resource.to_string(), query.clone()));
            Ok("ok".into())
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn remote_runtime_sends_session_scoped_query() {
        let engine = Arc::new(EchoEngine {
            seen: Mutex::new(Vec::new()),
        });
        let runtime = RemoteAgentRuntime::new(engine.clone(), "projects/p/locations/l/reasoningEngines/3");

        let out = runtime.stream_query("4200", "4200", TX).await.unwrap();

        assert_eq!(out, "ok");
        let seen = engine.seen.lock();
        assert_eq!(seen[0].0, "projects/p/locations/l/reasoningEngines/3");
        assert_eq!(seen[0].1, StreamQuery::new("4200", Some("4200"), TX));
    }
}
