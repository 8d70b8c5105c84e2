//! Proxy session configuration

use std::time::Duration;

/// Configuration options for proxy sessions
///
/// `msg_timeout` has no safe default and must be provided; it bounds each
/// send and each receive of a normal exchange. The lazy-pirate worst case
/// for a single command is roughly
/// `max_retries × (msg_timeout + retry_interval)`.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Timeout applied to each side of the handshake exchange
    pub handshake_timeout: Duration,

    /// Timeout applied to each send and receive of a normal exchange
    pub msg_timeout: Duration,

    /// Number of lazy-pirate attempts before a send is declared dead
    pub max_retries: u32,

    /// Pause between attempts
    pub retry_interval: Duration,
}

impl ProxyConfig {
    /// Create a config with the given message timeout and defaults for
    /// everything else
    pub fn new(msg_timeout: Duration) -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            msg_timeout,
            max_retries: 3,
            retry_interval: Duration::from_millis(200),
        }
    }

    /// Set the handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the number of lazy-pirate attempts
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    /// Set the pause between attempts
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }
}
