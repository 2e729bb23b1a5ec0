//! Pub/Sub publisher over the REST `topics.publish` endpoint.

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::traits::{PublishError, PublishResult, Publisher, PublisherFactory, PubsubMessage, TopicName};
use crate::config::Config;
use crate::util::sanitize_api_error;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

/// Publisher bound to a single topic.
pub struct HttpPublisher {
    client: reqwest::Client,
    endpoint: String,
    topic: TopicName,
    access_token: Option<String>,
    timeout: Duration,
    closed: AtomicBool,
}

impl HttpPublisher {
    pub fn new(
        client: reqwest::Client,
        endpoint: &str,
        topic: TopicName,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            topic,
            access_token,
            timeout,
            closed: AtomicBool::new(false),
        }
    }

    fn publish_url(&self) -> String {
        format!("{}/v1/{}:publish", self.endpoint, self.topic)
    }

    fn request_body(message: &PubsubMessage) -> Value {
        let mut wire = Map::new();
        wire.insert(
            "data".into(),
            Value::String(base64::engine::general_purpose::STANDARD.encode(&message.data)),
        );
        if let Some(key) = message.ordering_key.as_deref().filter(|k| !k.is_empty()) {
            wire.insert("orderingKey".into(), Value::String(key.to_string()));
        }
        if !message.attributes.is_empty() {
            wire.insert("attributes".into(), json!(message.attributes));
        }
        json!({ "messages": [Value::Object(wire)] })
    }

    async fn send(&self, message: &PubsubMessage) -> PublishResult<String> {
        let mut request = self
            .client
            .post(self.publish_url())
            .json(&Self::request_body(message));
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                topic: self.topic.to_string(),
                status: status.as_u16(),
                body: sanitize_api_error(&body),
            });
        }

        let parsed: PublishResponse = response.json().await?;
        parsed
            .message_ids
            .into_iter()
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PublishError::MissingAck {
                topic: self.topic.to_string(),
            })
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    fn topic(&self) -> &TopicName {
        &self.topic
    }

    async fn publish(&self, message: PubsubMessage) -> PublishResult<String> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PublishError::Closed {
                topic: self.topic.to_string(),
            });
        }
        match tokio::time::timeout(self.timeout, self.send(&message)).await {
            Ok(result) => result,
            Err(_) => Err(PublishError::Timeout {
                topic: self.topic.to_string(),
                secs: self.timeout.as_secs(),
            }),
        }
    }

    async fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(topic = %self.topic, "publisher shut down");
        }
    }
}

/// Creates [`HttpPublisher`]s that share one HTTP client.
pub struct HttpPublisherFactory {
    client: reqwest::Client,
    endpoint: String,
    access_token: Option<String>,
    timeout: Duration,
}

impl HttpPublisherFactory {
    pub fn new(
        client: reqwest::Client,
        endpoint: &str,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            access_token,
            timeout,
        }
    }

    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        Self::new(
            client,
            &config.pubsub.endpoint,
            config.project.access_token.clone(),
            Duration::from_secs(config.pubsub.publish_timeout_secs),
        )
    }
}

impl PublisherFactory for HttpPublisherFactory {
    fn create(&self, topic: &TopicName) -> PublishResult<Arc<dyn Publisher>> {
        Ok(Arc::new(HttpPublisher::new(
            self.client.clone(),
            &self.endpoint,
            topic.clone(),
            self.access_token.clone(),
            self.timeout,
        )))
    }

    fn name(&self) -> &str {
        "http"
    }
}
