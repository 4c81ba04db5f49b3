//! Local in-memory store for development and testing
//!
//! Mirrors the contract of the PostgreSQL backend: table names equal metric
//! names, series ids are assigned monotonically per unique canonical label
//! set, and copied rows are kept per table in arrival order. Failure
//! injection hooks cover the store-error paths exercised by tests.

use super::{SampleRow, SeriesKey, Store};
use crate::model::SeriesId;
use crate::{Error, Result};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

/// In-memory [`Store`] implementation.
#[derive(Default, Debug)]
pub struct LocalStore {
    /// metric name -> data table name
    tables: DashMap<String, String>,
    /// (metric, names, values) -> series id
    series: Mutex<HashMap<(String, Vec<String>, Vec<String>), SeriesId>>,
    next_series_id: AtomicI64,
    /// table name -> rows in arrival order
    rows: Mutex<HashMap<String, Vec<SampleRow>>>,
    finalize_calls: AtomicU64,
    resolve_calls: AtomicU64,
    fail_next_copy: AtomicBool,
    failing_metrics: Mutex<HashSet<String>>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `copy_samples` call fail with a storage error.
    pub fn fail_next_copy(&self) {
        self.fail_next_copy.store(true, Ordering::SeqCst);
    }

    /// Make table resolution fail permanently for the given metric.
    pub fn fail_table_resolution(&self, metric: &str) {
        self.failing_metrics.lock().insert(metric.to_string());
    }

    /// Rows copied into a table so far, in arrival order.
    pub fn rows_for_table(&self, table_name: &str) -> Vec<SampleRow> {
        self.rows
            .lock()
            .get(table_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Total rows copied across all tables.
    pub fn total_rows(&self) -> usize {
        self.rows.lock().values().map(Vec::len).sum()
    }

    /// Number of distinct series ids handed out.
    pub fn series_count(&self) -> usize {
        self.series.lock().len()
    }

    /// Number of `resolve_series_ids` stored-routine invocations (one per
    /// key, matching one transaction each on the real store).
    pub fn resolution_count(&self) -> u64 {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    /// Number of `finalize_metric_creation` invocations.
    pub fn finalize_count(&self) -> u64 {
        self.finalize_calls.load(Ordering::SeqCst)
    }

    /// Number of metric tables created.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

#[async_trait]
impl Store for LocalStore {
    async fn get_or_create_metric_table_name(&self, metric: &str) -> Result<(String, bool)> {
        if self.failing_metrics.lock().contains(metric) {
            return Err(Error::Storage(format!(
                "injected table resolution failure for {metric}"
            )));
        }
        match self.tables.entry(metric.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(e) => Ok((e.get().clone(), false)),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(metric.to_string());
                Ok((metric.to_string(), true))
            }
        }
    }

    async fn resolve_series_ids(
        &self,
        metric: &str,
        keys: &[SeriesKey],
    ) -> Result<Vec<(String, SeriesId)>> {
        self.resolve_calls
            .fetch_add(keys.len() as u64, Ordering::SeqCst);
        let mut series = self.series.lock();
        let mut resolved = Vec::with_capacity(keys.len());
        for key in keys {
            let id = *series
                .entry((metric.to_string(), key.names.clone(), key.values.clone()))
                .or_insert_with(|| {
                    SeriesId(self.next_series_id.fetch_add(1, Ordering::SeqCst) + 1)
                });
            resolved.push((metric.to_string(), id));
        }
        Ok(resolved)
    }

    async fn copy_samples(&self, table_name: &str, rows: Vec<SampleRow>) -> Result<u64> {
        if self.fail_next_copy.swap(false, Ordering::SeqCst) {
            return Err(Error::Storage("injected copy failure".to_string()));
        }
        let written = rows.len() as u64;
        self.rows
            .lock()
            .entry(table_name.to_string())
            .or_default()
            .extend(rows);
        Ok(written)
    }

    async fn finalize_metric_creation(&self) -> Result<()> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(names: &[&str], values: &[&str]) -> SeriesKey {
        SeriesKey {
            names: names.iter().map(|s| s.to_string()).collect(),
            values: values.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn table_creation_reports_possibly_new_once() {
        let store = LocalStore::new();
        let (table, created) = store.get_or_create_metric_table_name("cpu").await.unwrap();
        assert_eq!(table, "cpu");
        assert!(created);

        let (_, created_again) = store.get_or_create_metric_table_name("cpu").await.unwrap();
        assert!(!created_again);
    }

    #[tokio::test]
    async fn equal_keys_resolve_to_equal_ids() {
        let store = LocalStore::new();
        let k = key(&["__name__", "a"], &["m", "1"]);
        let first = store.resolve_series_ids("m", &[k.clone()]).await.unwrap();
        let second = store.resolve_series_ids("m", &[k]).await.unwrap();
        assert_eq!(first[0].1, second[0].1);
        assert_eq!(store.series_count(), 1);
    }

    #[tokio::test]
    async fn injected_copy_failure_fires_once() {
        let store = LocalStore::new();
        store.fail_next_copy();
        let row = SampleRow {
            timestamp_ms: 1,
            value: 1.0,
            series_id: SeriesId(1),
        };
        assert!(store.copy_samples("t", vec![row]).await.is_err());
        assert_eq!(store.copy_samples("t", vec![row]).await.unwrap(), 1);
        assert_eq!(store.rows_for_table("t").len(), 1);
    }
}
