use super::traits::{Tool, ToolResult};
use crate::observability::Metrics;
use crate::pubsub::{PublishError, PublisherRegistry, PubsubMessage};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// Empty object returned to the model whatever the publish outcome.
const EMPTY_RESULT: &str = "{}";

/// Let the agent publish a JSON record to a Pub/Sub topic.
///
/// Failures never reach the model: they are logged with
/// `error_kind = "publish_failed"` and counted, and the call still returns `{}`.
pub struct PublishRecordTool {
    registry: Arc<PublisherRegistry>,
    metrics: Arc<Metrics>,
}

#[derive(Debug, thiserror::Error)]
enum PublishRecordError {
    #[error("Missing '{0}' parameter")]
    MissingArgument(&'static str),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl PublishRecordTool {
    pub fn new(registry: Arc<PublisherRegistry>, metrics: Arc<Metrics>) -> Self {
        Self { registry, metrics }
    }

    pub fn registry(&self) -> &Arc<PublisherRegistry> {
        &self.registry
    }

    /// Publish `json_payload` to `topic` and wait for the acknowledgement.
    ///
    /// Always returns `{}`.
    pub async fn publish_record(&self, topic: &str, json_payload: &str) -> String {
        tracing::info!("PUBLISH {topic} {json_payload}");
        let outcome = self.try_publish(topic, json_payload).await;
        self.finish(topic, outcome.map_err(PublishRecordError::from));
        EMPTY_RESULT.to_string()
    }

    async fn try_publish(&self, topic: &str, json_payload: &str) -> Result<String, PublishError> {
        let publisher = self.registry.acquire(topic)?;
        publisher
            .publish(PubsubMessage::new(json_payload.as_bytes()))
            .await
    }

    fn finish(&self, topic: &str, outcome: Result<String, PublishRecordError>) {
        match outcome {
            Ok(message_id) => {
                tracing::info!(topic, message_id = %message_id, "Successfully published");
                self.metrics.record_publish(topic, true);
            }
            Err(e) => {
                tracing::error!(
                    error_kind = "publish_failed",
                    topic,
                    "Could not publish: {e}"
                );
                self.metrics.record_publish(topic, false);
            }
        }
    }
}

fn string_arg<'a>(
    args: &'a serde_json::Value,
    key: &'static str,
) -> Result<&'a str, PublishRecordError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or(PublishRecordError::MissingArgument(key))
}

#[async_trait]
impl Tool for PublishRecordTool {
    fn name(&self) -> &str {
        "publish_record"
    }

    fn description(&self) -> &str {
        "Publishes a JSON string to a Google Cloud Pub/Sub topic."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "topic": {
                    "type": "string",
                    "description": "The topic to which to publish (e.g. 'projects/your-project-id/topics/your-topic-id')"
                },
                "json_payload": {
                    "type": "string",
                    "description": "The JSON string to publish"
                }
            },
            "required": ["topic", "json_payload"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let output = match (string_arg(&args, "topic"), string_arg(&args, "json_payload")) {
            (Ok(topic), Ok(payload)) => self.publish_record(topic, payload).await,
            (topic, payload) => {
                let topic_label = topic.as_ref().map_or("", |t| *t);
                if let Err(err) = topic.and(payload) {
                    self.finish(topic_label, Err(err));
                }
                EMPTY_RESULT.to_string()
            }
        };

        Ok(ToolResult {
            success: true,
            output,
            error: None,
        })
    }
}
