//! # promgres
//!
//! Ingestion engine bridging Prometheus remote-write to a
//! PostgreSQL/TimescaleDB time-series schema.
//!
//! Incoming write requests map metric names to batches of labeled samples.
//! The engine resolves each unique label set to a store-assigned series id,
//! routes samples to one long-lived writer task per metric, and lands rows
//! with amortized bulk COPY while preserving per-metric ordering and
//! acknowledgement semantics.
//!
//! ## Architecture
//!
//! - **Ingestor**: fans requests out to per-metric writers, tracks
//!   completion with a latch per request, returns synchronously or
//!   asynchronously depending on configuration
//! - **Writer**: one task per metric; owns the metric's table, a local
//!   series-id cache, and a pending buffer flushed by size or staleness
//! - **Completer**: coalesces new-metric signals into idempotent
//!   finalization calls against the store
//! - **Store**: typed façade over the catalog routines and bulk COPY,
//!   with PostgreSQL and in-memory implementations

pub mod cache;
pub mod config;
pub mod ingestor;
pub mod labels;
pub mod model;
pub mod storage;

mod error;

pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::cache::MetricNameCache;
    pub use crate::ingestor::{Ingestor, IngestorConfig};
    pub use crate::labels::Labels;
    pub use crate::model::{Sample, SampleBatch, SeriesId, WriteRequest};
    pub use crate::storage::{LocalStore, PgStore, Store};
}
