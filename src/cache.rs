//! Metric-name cache
//!
//! Bounded mapping from metric name to storage table name, shared by every
//! per-metric writer. The cache is advisory: `get` may miss after a
//! previous `set` (eviction) and `set` may silently drop an entry, so
//! callers always fall back to the store.

use moka::sync::Cache;

/// Default capacity, in entries.
pub const DEFAULT_METRIC_CACHE_CAPACITY: u64 = 10_000;

/// Approximately-LRU cache from metric name to data table name.
///
/// Backed by moka's TinyLFU policy; exact LRU is not required, only bounded
/// capacity with a hit rate that grows with capacity.
#[derive(Clone)]
pub struct MetricNameCache {
    inner: Cache<String, String>,
}

impl MetricNameCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Cache::new(capacity),
        }
    }

    /// Look up the table name for a metric.
    pub fn get(&self, metric: &str) -> Option<String> {
        self.inner.get(metric)
    }

    /// Record the table name for a metric, best effort.
    pub fn set(&self, metric: &str, table_name: &str) {
        self.inner
            .insert(metric.to_string(), table_name.to_string());
    }
}

impl Default for MetricNameCache {
    fn default() -> Self {
        Self::new(DEFAULT_METRIC_CACHE_CAPACITY)
    }
}

impl std::fmt::Debug for MetricNameCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricNameCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_what_set_stored() {
        let cache = MetricNameCache::new(16);
        assert_eq!(cache.get("http_requests_total"), None);

        cache.set("http_requests_total", "http_requests_total");
        assert_eq!(
            cache.get("http_requests_total").as_deref(),
            Some("http_requests_total")
        );
    }

    #[test]
    fn distinct_metrics_do_not_collide() {
        let cache = MetricNameCache::new(16);
        cache.set("a", "table_a");
        cache.set("b", "table_b");
        assert_eq!(cache.get("a").as_deref(), Some("table_a"));
        assert_eq!(cache.get("b").as_deref(), Some("table_b"));
    }
}
