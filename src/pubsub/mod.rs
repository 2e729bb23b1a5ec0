//! Pub/Sub publishing: topic names, the publisher seam, and the per-topic cache.
//!
//! Publishers implement [`Publisher`]; a [`PublisherRegistry`] owns one
//! publisher per topic and builds new ones through a [`PublisherFactory`].

pub mod http;
pub mod registry;
pub mod traits;

pub use http::{HttpPublisher, HttpPublisherFactory};
pub use registry::PublisherRegistry;
#[allow(unused_imports)]
pub use traits::{
    PublishError, PublishResult, Publisher, PublisherFactory, PubsubMessage, TopicName,
};

use crate::config::Config;
use std::sync::Arc;

/// Registry backed by the REST publisher configured in `[pubsub]`.
pub fn create_publisher_registry(config: &Config, client: reqwest::Client) -> PublisherRegistry {
    PublisherRegistry::new(Arc::new(HttpPublisherFactory::from_config(config, client)))
}
