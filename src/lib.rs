//! cogrelay — single-host coordinator for remote neuroscience experiments
//!
//! The coordinator runs next to the experiment rig and gives remote clients
//! one HTTP surface for three concerns:
//!
//! - **Telemetry fan-out** ([`broadcast`]): named topics carry raw byte
//!   payloads from publishers to any number of server-sent-event
//!   subscribers, with bounded per-subscriber queues and history replay
//!   for late joiners.
//! - **Command proxying** ([`proxy`]): nicknamed long-lived ZeroMQ REQ/REP
//!   client sessions forward synchronous commands to experiment workers,
//!   with a lazy-pirate reliability loop (timeout, socket recreation,
//!   bounded retries).
//! - **Experiment lifecycle** ([`experiments`]): a durable record store of
//!   registered experiments, git/archive source retrieval, and a
//!   single-slot subprocess supervisor.
//!
//! ```text
//!                       ┌───────────────────────────┐
//!   publishers ──POST──►│  BroadcastHub             │──SSE──► subscribers
//!                       ├───────────────────────────┤
//!   clients ────POST───►│  ProxyRegistry            │──REQ/REP──► workers
//!                       ├───────────────────────────┤
//!   operators ──CRUD───►│  ExperimentService        │──spawn──► local process
//!                       └───────────────────────────┘
//!                               server (axum, /api)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use cogrelay::experiments::ExperimentService;
//! use cogrelay::proxy::{ProxyConfig, ProxyRegistry};
//! use cogrelay::server::{self, AppState, ServerConfig};
//! use cogrelay::BroadcastHub;
//!
//! # async fn run() -> cogrelay::Result<()> {
//! let state = AppState {
//!     hub: Arc::new(BroadcastHub::new()),
//!     proxies: Arc::new(ProxyRegistry::new(ProxyConfig::new(Duration::from_secs(1)))),
//!     experiments: Arc::new(ExperimentService::open("/var/lib/cogrelay/experiments")?),
//!     status: Default::default(),
//! };
//! server::serve(state, ServerConfig::default()).await
//! # }
//! ```

pub mod broadcast;
pub mod error;
pub mod experiments;
pub mod proxy;
pub mod server;

pub use broadcast::{BroadcastHub, HubConfig};
pub use error::{Error, Result};
