//! Command proxy sessions
//!
//! Remote experiment workers expose a ZeroMQ REP socket; the coordinator
//! keeps one long-lived REQ client session per worker, registered under a
//! nickname. HTTP clients post raw command bytes to a nickname and get the
//! worker's reply bytes back from a single request/reply roundtrip.
//!
//! # Session lifecycle
//!
//! ```text
//! Created ──► Handshaking ──► Available ⇄ Recovering ──► Closed
//!                  │                        (socket
//!                  └── failure ──► Closed    recreate)
//! ```
//!
//! A new session greets its worker with `{"request":"Hello"}` and expects
//! `{"response":"World"}` back before it accepts commands. Sends follow
//! the lazy-pirate pattern: a bounded number of attempts, each with its
//! own timeout, discarding and recreating the REQ socket between attempts
//! because a REQ socket that timed out mid-exchange cannot legally send
//! again. Exhausting the attempts destroys the session.

pub mod config;
pub mod error;
pub mod registry;
pub mod session;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use registry::{ProxyEndpoint, ProxyRegistry};
pub use session::ProxySession;
