//! Per-topic state and subscriber queues
//!
//! A topic owns its subscriber queues and its history buffer. All
//! membership changes, history appends, and fan-out iterations happen
//! under the topic mutex, which keeps the ordering guarantees simple:
//! whoever holds the lock decides the position of a payload in every
//! live queue and in history at once.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::config::HubConfig;

/// A named fan-out topic
pub struct Topic {
    name: String,
    inner: Mutex<TopicState>,
    config: HubConfig,
}

struct TopicState {
    subscribers: Vec<SubscriberQueue>,
    history: VecDeque<Bytes>,
    /// Set once when the topic is removed from the hub; closed topics
    /// reject new subscribers and publishes
    closed: bool,
}

struct SubscriberQueue {
    id: u64,
    tx: mpsc::Sender<Bytes>,
}

impl Topic {
    pub(super) fn new(name: impl Into<String>, config: HubConfig) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(TopicState {
                subscribers: Vec::new(),
                history: VecDeque::new(),
                closed: false,
            }),
            config,
        }
    }

    /// Topic name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of attached subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Number of payloads currently held for replay
    pub fn history_len(&self) -> usize {
        self.inner.lock().history.len()
    }

    /// Fan a payload out to every live subscriber, then append it to
    /// history. Queues that are full are skipped: the payload is dropped
    /// for that subscriber only and a warning is logged. Queues whose
    /// consumer has gone away are removed.
    ///
    /// Returns `false` if the topic has been closed.
    pub(super) fn publish(&self, payload: Bytes) -> bool {
        let mut state = self.inner.lock();
        if state.closed {
            return false;
        }

        let topic = self.name.as_str();
        state.subscribers.retain(|sub| {
            match sub.tx.try_send(payload.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        topic = %topic,
                        subscriber = sub.id,
                        "Subscriber queue full, dropping payload"
                    );
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(
                        topic = %topic,
                        subscriber = sub.id,
                        "Subscriber gone, removing queue"
                    );
                    false
                }
            }
        });

        if self.config.history_capacity > 0 {
            if state.history.len() == self.config.history_capacity {
                state.history.pop_front();
            }
            state.history.push_back(payload);
        }

        true
    }

    /// Attach a new subscriber: snapshot the history and register a
    /// bounded queue, atomically with respect to concurrent publishes.
    ///
    /// Returns `None` if the topic has been closed.
    pub(super) fn subscribe(self: &Arc<Self>, id: u64) -> Option<Subscription> {
        let mut state = self.inner.lock();
        if state.closed {
            return None;
        }

        let replay: VecDeque<Bytes> = state.history.iter().cloned().collect();
        let (tx, rx) = mpsc::channel(self.config.subscriber_queue_capacity);
        state.subscribers.push(SubscriberQueue { id, tx });

        tracing::debug!(
            topic = %self.name,
            subscriber = id,
            replay = replay.len(),
            "Subscriber attached"
        );

        Some(Subscription {
            replay,
            rx,
            _guard: SubscriberGuard {
                topic: Arc::clone(self),
                id,
            },
        })
    }

    /// Close the topic: drop every subscriber queue so in-flight
    /// subscriptions terminate, and refuse further operations.
    pub(super) fn close(&self) {
        let mut state = self.inner.lock();
        state.closed = true;
        state.subscribers.clear();
    }

    fn remove_subscriber(&self, id: u64) {
        let mut state = self.inner.lock();
        state.subscribers.retain(|sub| sub.id != id);
    }
}

/// A live subscription to a topic
///
/// Yields the history snapshot taken at subscribe time, in order, then
/// live payloads in publication order. The stream ends when the topic is
/// deleted. Dropping the subscription detaches its queue from the topic.
pub struct Subscription {
    replay: VecDeque<Bytes>,
    rx: mpsc::Receiver<Bytes>,
    _guard: SubscriberGuard,
}

impl Stream for Subscription {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        let this = self.get_mut();
        if let Some(payload) = this.replay.pop_front() {
            return Poll::Ready(Some(payload));
        }
        this.rx.poll_recv(cx)
    }
}

/// Detaches the subscriber queue when the consumer goes away
struct SubscriberGuard {
    topic: Arc<Topic>,
    id: u64,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.topic.remove_subscriber(self.id);
        tracing::debug!(
            topic = %self.topic.name(),
            subscriber = self.id,
            "Subscriber detached"
        );
    }
}
