//! Storage façade
//!
//! Typed wrapper over the store's four capabilities used by the ingest
//! path: metric table resolution, series-id resolution, bulk copy, and
//! metric-creation finalization. No business logic lives here.

mod local;
mod postgres;

pub use local::LocalStore;
pub use postgres::PgStore;

use crate::model::SeriesId;
use crate::Result;
use async_trait::async_trait;

/// Schema holding the per-metric data tables.
pub const DATA_SCHEMA: &str = "prom_data";
/// Schema holding the catalog routines.
pub const CATALOG_SCHEMA: &str = "_prom_catalog";
/// Data table column order; fixed by the store contract.
pub const COPY_COLUMNS: [&str; 3] = ["time", "value", "series_id"];

/// One data table row. Timestamps stay in milliseconds until the store
/// boundary, where they are encoded as the store's native UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRow {
    pub timestamp_ms: i64,
    pub value: f64,
    pub series_id: SeriesId,
}

/// Canonical label arrays for one series awaiting id resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesKey {
    pub names: Vec<String>,
    pub values: Vec<String>,
}

/// Store capabilities consumed by the ingestion engine.
///
/// Implementations must be safe for concurrent use by all writers;
/// connection pooling is the implementation's concern.
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug + 'static {
    /// Resolve (creating if needed) the data table for a metric. The flag
    /// is true when the metric may have just been created and a
    /// finalization pass is warranted.
    async fn get_or_create_metric_table_name(&self, metric: &str) -> Result<(String, bool)>;

    /// Resolve one series id per key. Each key must run in its own short
    /// transaction: distinct series inserts sharing a transaction can
    /// deadlock against other writers. Results are positionally aligned
    /// with `keys` and carry the data table name alongside the id.
    async fn resolve_series_ids(
        &self,
        metric: &str,
        keys: &[SeriesKey],
    ) -> Result<Vec<(String, SeriesId)>>;

    /// Bulk-insert rows into `prom_data.<table_name>` in the given order.
    /// Returns the number of rows written.
    async fn copy_samples(&self, table_name: &str, rows: Vec<SampleRow>) -> Result<u64>;

    /// Idempotent housekeeping routine completing pending metric
    /// creations.
    async fn finalize_metric_creation(&self) -> Result<()>;
}
