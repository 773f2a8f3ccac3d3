// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod change;
pub mod composite;
pub mod config;
pub mod cycle;
pub mod digest;
pub mod error;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod numeric;
pub mod resolve;
pub mod scheduler;
pub mod series;
pub mod snapshot;
pub mod staleness;

pub use crate::api::router;
pub use crate::snapshot::{Snapshot, SnapshotHandle};
