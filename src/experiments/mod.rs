//! Experiment lifecycle management
//!
//! An experiment is registered as a record describing where its files
//! come from (a git repository, an uploaded archive, or a local
//! directory) and which commands launch it. Records persist across
//! restarts in a single JSON file; at most one experiment process runs
//! at a time.
//!
//! - [`record`] — the record data model
//! - [`store`] — durable record store with take-and-restore updates
//! - [`process`] — single-slot subprocess supervisor
//! - [`source`] — git retrieval and archive installation
//! - [`service`] — the lifecycle operations the HTTP surface calls

pub mod error;
pub mod process;
pub mod record;
pub mod service;
pub mod source;
pub mod store;

pub use error::ExperimentError;
pub use process::{ProcessSupervisor, StartedProcess};
pub use record::{Exec, Experiment, ExperimentKind, ExperimentRecord, RecordStatus};
pub use service::ExperimentService;
pub use store::RecordStore;
