//! # rangepurge-engine
//!
//! Execution side of a range purge.
//!
//! This crate provides:
//! - Transport and progress-sink traits
//! - The batch purge loop with cancellation
//! - An in-memory transport for simulation and tests

pub mod memory;
pub mod runner;
pub mod transport;

pub use memory::InMemoryTransport;
pub use runner::{PurgeRunner, RunHandle, RunOutcome};
pub use transport::{
    HistoryCursor, MessageTransport, ProgressReport, ProgressSink, SinkError, TransportError,
};
