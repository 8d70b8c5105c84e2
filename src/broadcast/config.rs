//! Broadcast hub configuration

/// Configuration options for the broadcast hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of each subscriber queue; publishes to a full queue are
    /// dropped for that subscriber
    pub subscriber_queue_capacity: usize,

    /// Maximum number of payloads retained for history replay; the oldest
    /// entry is evicted once the buffer is full
    pub history_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: 10,
            history_capacity: 1024,
        }
    }
}

impl HubConfig {
    /// Set the subscriber queue capacity
    pub fn subscriber_queue_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_queue_capacity = capacity.max(1);
        self
    }

    /// Set the history buffer capacity
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }
}
