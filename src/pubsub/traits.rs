//! Publisher traits and message types.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

pub type PublishResult<T> = std::result::Result<T, PublishError>;

/// Errors raised while resolving a topic or delivering a message.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("invalid topic name '{0}': expected projects/{{project}}/topics/{{topic}}")]
    InvalidTopic(String),
    #[error("publish to {topic} rejected with {status}: {body}")]
    Rejected {
        topic: String,
        status: u16,
        body: String,
    },
    #[error("publish to {topic} returned no message id")]
    MissingAck { topic: String },
    #[error("publish to {topic} timed out after {secs}s")]
    Timeout { topic: String, secs: u64 },
    #[error("publisher for {topic} is shut down")]
    Closed { topic: String },
    #[error("publish transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

fn topic_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^projects/([A-Za-z0-9][A-Za-z0-9.:_-]*)/topics/([A-Za-z][A-Za-z0-9._~+%-]{2,254})$")
            .unwrap_or_else(|e| panic!("topic pattern must compile: {e}"))
    })
}

/// Fully-qualified topic path (`projects/{project}/topics/{topic}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicName {
    project: String,
    topic: String,
}

impl TopicName {
    pub fn parse(path: &str) -> PublishResult<Self> {
        let trimmed = path.trim();
        let caps = topic_pattern()
            .captures(trimmed)
            .ok_or_else(|| PublishError::InvalidTopic(path.to_string()))?;
        Ok(Self {
            project: caps[1].to_string(),
            topic: caps[2].to_string(),
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projects/{}/topics/{}", self.project, self.topic)
    }
}

/// One message bound for a topic. `data` is raw bytes; transports encode it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PubsubMessage {
    pub data: Vec<u8>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub ordering_key: Option<String>,
}

impl PubsubMessage {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn with_ordering_key(mut self, key: impl Into<String>) -> Self {
        self.ordering_key = Some(key.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A handle that delivers messages to one topic.
///
/// `publish` resolves once the broker has acknowledged the message and
/// returns the broker-assigned message id.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn topic(&self) -> &TopicName;

    async fn publish(&self, message: PubsubMessage) -> PublishResult<String>;

    /// Stop accepting messages. Later `publish` calls fail with
    /// [`PublishError::Closed`].
    async fn shutdown(&self);
}

/// Builds publishers on demand for a [`PublisherRegistry`](super::PublisherRegistry).
pub trait PublisherFactory: Send + Sync {
    fn create(&self, topic: &TopicName) -> PublishResult<Arc<dyn Publisher>>;

    fn name(&self) -> &str;
}
