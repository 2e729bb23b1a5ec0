//! Process-wide publisher cache, one publisher per topic.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::traits::{PublishError, PublishResult, Publisher, PublisherFactory, TopicName};

/// Hands out one shared [`Publisher`] per topic, creating it on first use.
///
/// Publishers live until [`release`](Self::release) or
/// [`shutdown`](Self::shutdown) is called.
pub struct PublisherRegistry {
    factory: Arc<dyn PublisherFactory>,
    state: Mutex<RegistryState>,
}

/// The closed flag guards inserts, so both live under one lock.
#[derive(Default)]
struct RegistryState {
    publishers: HashMap<TopicName, Arc<dyn Publisher>>,
    closed: bool,
}

impl PublisherRegistry {
    pub fn new(factory: Arc<dyn PublisherFactory>) -> Self {
        Self {
            factory,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Return the cached publisher for `topic`, creating it if needed.
    pub fn acquire(&self, topic: &str) -> PublishResult<Arc<dyn Publisher>> {
        let name = TopicName::parse(topic)?;

        let mut state = self.state.lock();
        if state.closed {
            return Err(PublishError::Closed {
                topic: name.to_string(),
            });
        }
        if let Some(existing) = state.publishers.get(&name) {
            return Ok(Arc::clone(existing));
        }

        let publisher = self.factory.create(&name)?;
        tracing::debug!(topic = %name, factory = self.factory.name(), "publisher created");
        state.publishers.insert(name, Arc::clone(&publisher));
        Ok(publisher)
    }

    /// Drop and shut down the publisher for `topic`. Returns whether one existed.
    pub async fn release(&self, topic: &str) -> PublishResult<bool> {
        let name = TopicName::parse(topic)?;
        let removed = self.state.lock().publishers.remove(&name);
        match removed {
            Some(publisher) => {
                publisher.shutdown().await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Shut down every cached publisher and refuse new ones.
    pub async fn shutdown(&self) -> PublishResult<()> {
        let drained: Vec<Arc<dyn Publisher>> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.publishers.drain().map(|(_, p)| p).collect()
        };
        let count = drained.len();
        for publisher in drained {
            publisher.shutdown().await;
        }
        tracing::info!(publishers = count, "publisher registry shut down");
        Ok(())
    }

    /// Cached topic paths, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .state
            .lock()
            .publishers
            .keys()
            .map(ToString::to_string)
            .collect();
        topics.sort();
        topics
    }

    pub fn len(&self) -> usize {
        self.state.lock().publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
