//! Broadcast hub for telemetry fan-out
//!
//! The hub manages named topics and routes raw byte payloads from
//! publishers to subscribers. Each subscriber owns a bounded queue; a
//! publisher never blocks on a slow consumer — messages that do not fit
//! are dropped for that subscriber only.
//!
//! # Architecture
//!
//! ```text
//!                           Arc<BroadcastHub>
//!                     ┌──────────────────────────┐
//!                     │ topics: HashMap<String,  │
//!                     │   Arc<Topic> {           │
//!                     │     subscribers,         │
//!                     │     history,             │
//!                     │   }                      │
//!                     │ >                        │
//!                     └────────────┬─────────────┘
//!                                  │
//!          ┌───────────────────────┼───────────────────────┐
//!          │                       │                       │
//!          ▼                       ▼                       ▼
//!     [Publisher]            [Subscriber]            [Subscriber]
//!     publish()              stream.next()           stream.next()
//!          │                       │                       │
//!          └──► topic fan-out ──► bounded queue ──► SSE response
//! ```
//!
//! # Ordering
//!
//! Publishes to a topic are serialized by the topic lock: every live
//! subscriber observes them in the same order, and a new subscriber
//! replays the history snapshot taken at subscribe time before seeing any
//! live payload.
//!
//! # Zero-copy design
//!
//! Payloads are `bytes::Bytes`, so fan-out clones are reference-counted
//! rather than copied.

pub mod config;
pub mod error;
pub mod hub;
pub mod mock;
pub mod topic;

pub use config::HubConfig;
pub use error::HubError;
pub use hub::BroadcastHub;
pub use mock::{trial_stream, TrialRecord, TrialResult};
pub use topic::Subscription;
