//! Broadcast hub implementation
//!
//! The hub is the registry of named topics. It is read-heavy: publish and
//! subscribe only take the read side of the outer lock, while create and
//! delete take the write side. Per-topic work happens under the topic's
//! own mutex so registry readers are never held up by a slow fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use super::config::HubConfig;
use super::error::HubError;
use super::topic::{Subscription, Topic};

/// Name of the topic that exists from startup
pub const DEFAULT_TOPIC: &str = "default";

/// Registry of named fan-out topics
pub struct BroadcastHub {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    config: HubConfig,
    next_subscriber_id: AtomicU64,
}

impl BroadcastHub {
    /// Create a hub with default configuration and the `default` topic
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a hub with custom configuration
    pub fn with_config(config: HubConfig) -> Self {
        let mut topics = HashMap::new();
        topics.insert(
            DEFAULT_TOPIC.to_string(),
            Arc::new(Topic::new(DEFAULT_TOPIC, config.clone())),
        );

        Self {
            topics: RwLock::new(topics),
            config,
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    /// Names of all current topics
    pub fn list(&self) -> Vec<String> {
        self.topics.read().keys().cloned().collect()
    }

    /// Create an empty topic
    pub fn create(&self, name: &str) -> Result<(), HubError> {
        let mut topics = self.topics.write();
        if topics.contains_key(name) {
            return Err(HubError::TopicAlreadyExists(name.to_string()));
        }

        topics.insert(
            name.to_string(),
            Arc::new(Topic::new(name, self.config.clone())),
        );
        tracing::info!(topic = %name, "Broadcast topic created");
        Ok(())
    }

    /// Publish a payload to a topic
    ///
    /// The payload is delivered to every live subscriber queue without
    /// blocking (full queues drop it) and appended to the topic history.
    pub fn publish(&self, name: &str, payload: Bytes) -> Result<(), HubError> {
        let topic = self.get(name)?;
        if !topic.publish(payload) {
            // Closed between registry lookup and fan-out
            return Err(HubError::TopicNotFound(name.to_string()));
        }
        Ok(())
    }

    /// Subscribe to a topic
    ///
    /// The returned stream yields the history snapshot first, then live
    /// payloads until the topic is deleted or the subscription is dropped.
    pub fn subscribe(&self, name: &str) -> Result<Subscription, HubError> {
        let topic = self.get(name)?;
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        topic
            .subscribe(id)
            .ok_or_else(|| HubError::TopicNotFound(name.to_string()))
    }

    /// Delete a topic; in-flight subscriptions terminate as their queues
    /// close
    pub fn delete(&self, name: &str) -> Result<(), HubError> {
        let topic = self
            .topics
            .write()
            .remove(name)
            .ok_or_else(|| HubError::TopicNotFound(name.to_string()))?;

        topic.close();
        tracing::info!(topic = %name, "Broadcast topic deleted");
        Ok(())
    }

    /// Number of subscribers currently attached to a topic
    pub fn subscriber_count(&self, name: &str) -> Result<usize, HubError> {
        Ok(self.get(name)?.subscriber_count())
    }

    fn get(&self, name: &str) -> Result<Arc<Topic>, HubError> {
        self.topics
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| HubError::TopicNotFound(name.to_string()))
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
