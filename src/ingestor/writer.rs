//! Per-metric writer task
//!
//! Each metric gets one long-lived task that owns exclusive access to that
//! metric's data table. The task resolves its table on startup, then loops:
//! block for a request when the buffer is empty, otherwise hot-drain the
//! mailbox and flush. A flush resolves missing series ids through the
//! writer-local cache and the store, bulk-copies the buffered rows, and
//! delivers the outcome to every attached request.

use super::buffer::{PendingBuffer, FLUSH_SIZE};
use super::{telemetry, InsertDataRequest};
use crate::cache::MetricNameCache;
use crate::labels::Labels;
use crate::model::{SampleBatch, SeriesId};
use crate::storage::{SampleRow, SeriesKey, Store};
use crate::{Error, Result};

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Entry point for a spawned writer.
pub(crate) async fn run(
    store: Arc<dyn Store>,
    metric: String,
    input: mpsc::Receiver<InsertDataRequest>,
    completer_signal: mpsc::Sender<()>,
    table_names: MetricNameCache,
) {
    let table_name =
        match resolve_table_name(&*store, &metric, &completer_signal, &table_names).await {
            Ok(table_name) => table_name,
            Err(e) => {
                warn!(metric = %metric, error = %e, "table resolution failed, poisoning writer");
                drain_poisoned(input, e).await;
                return;
            }
        };

    let mut writer = MetricWriter {
        store,
        metric,
        table_name,
        input,
        pending: PendingBuffer::new(),
        series_ids: HashMap::new(),
    };
    writer.run_loop().await;
}

/// Cache lookup with store fallback. A `possibly_new` table nudges the
/// completer; the signal is dropped if one is already in flight.
async fn resolve_table_name(
    store: &dyn Store,
    metric: &str,
    completer_signal: &mpsc::Sender<()>,
    table_names: &MetricNameCache,
) -> Result<String> {
    if let Some(table_name) = table_names.get(metric) {
        return Ok(table_name);
    }

    let (table_name, possibly_new) = store.get_or_create_metric_table_name(metric).await?;
    table_names.set(metric, &table_name);
    if possibly_new {
        let _ = completer_signal.try_send(());
    }
    Ok(table_name)
}

/// Terminal state after table resolution failed: every subsequent request
/// receives a clone of the original error and completes its latch share.
async fn drain_poisoned(mut input: mpsc::Receiver<InsertDataRequest>, error: Error) {
    while let Some(req) = input.recv().await {
        let _ = req.error_sink.try_send(error.clone());
        // dropping the request completes its share of the latch
    }
}

struct MetricWriter {
    store: Arc<dyn Store>,
    metric: String,
    table_name: String,
    input: mpsc::Receiver<InsertDataRequest>,
    pending: PendingBuffer,
    /// fingerprint -> series id, local to this writer
    series_ids: HashMap<String, SeriesId>,
}

impl MetricWriter {
    async fn run_loop(&mut self) {
        loop {
            if self.pending.is_empty() {
                match self.input.recv().await {
                    Some(req) => {
                        self.handle_req(req).await;
                        continue;
                    }
                    None => {
                        debug!(metric = %self.metric, "mailbox closed, writer exiting");
                        return;
                    }
                }
            }

            // Hot receive: drain whatever is queued without blocking, but
            // stop once the buffer is full enough or the oldest pending
            // task has waited out the staleness deadline.
            let deadline = self.pending.staleness_deadline();
            loop {
                if self.pending.row_count() >= FLUSH_SIZE {
                    break;
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    break;
                }
                match self.input.try_recv() {
                    Ok(req) => {
                        if self.handle_req(req).await {
                            break;
                        }
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }

            self.flush().await;
        }
    }

    /// Buffer one request, flushing first if it tips the buffer over the
    /// size threshold. Returns true when a flush happened.
    async fn handle_req(&mut self, mut req: InsertDataRequest) -> bool {
        trace!(metric = %req.metric, batches = req.batches.len(), "buffering insert request");
        fill_known_series_ids(&self.series_ids, &mut req.batches);
        if self.pending.add_req(req) {
            self.flush().await;
            return true;
        }
        false
    }

    async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let rows = self.pending.row_count();
        let started = Instant::now();
        let result = self.flush_pending().await;
        match &result {
            Ok(written) => {
                telemetry::record_flush(started.elapsed().as_secs_f64(), *written);
                debug!(metric = %self.metric, rows = written, "flushed");
            }
            Err(e) => {
                telemetry::record_flush_failure();
                warn!(metric = %self.metric, rows, error = %e, "flush failed");
            }
        }
        self.pending.complete(result.err().as_ref());
    }

    /// Series resolution followed by bulk copy. Any failure fails the
    /// whole buffer; the writer itself stays healthy.
    async fn flush_pending(&mut self) -> Result<u64> {
        self.set_series_ids().await?;
        let rows = self.materialize_rows()?;
        self.store.copy_samples(&self.table_name, rows).await
    }

    /// Resolve series ids for every batch that the local cache could not
    /// satisfy. Unresolved batches are ordered by fingerprint so equal
    /// label sets sit adjacent, then grouped into clusters of one store
    /// call each.
    async fn set_series_ids(&mut self) -> Result<()> {
        let missing = fill_known_series_ids(&self.series_ids, self.pending.batches_mut());
        if missing == 0 {
            return Ok(());
        }

        let batches = self.pending.batches();
        let mut unresolved: Vec<usize> = (0..batches.len())
            .filter(|&i| batches[i].series_id().is_none())
            .collect();
        unresolved.sort_by(|&a, &b| {
            let fp = |i: usize| batches[i].labels().map(Labels::fingerprint);
            fp(a).cmp(&fp(b))
        });

        let mut clusters: Vec<Vec<usize>> = Vec::new();
        let mut cluster_fingerprints: Vec<String> = Vec::new();
        let mut keys: Vec<SeriesKey> = Vec::new();
        for &i in &unresolved {
            let labels = match batches[i].labels() {
                Some(labels) => labels,
                None => {
                    return Err(Error::Internal(
                        "unresolved batch without labels".to_string(),
                    ))
                }
            };
            if cluster_fingerprints.last().map(String::as_str) == Some(labels.fingerprint()) {
                if let Some(cluster) = clusters.last_mut() {
                    cluster.push(i);
                }
                continue;
            }
            cluster_fingerprints.push(labels.fingerprint().to_string());
            keys.push(SeriesKey {
                names: labels.names().to_vec(),
                values: labels.values().to_vec(),
            });
            clusters.push(vec![i]);
        }

        let resolved = self.store.resolve_series_ids(&self.metric, &keys).await?;
        if resolved.len() != clusters.len() {
            return Err(Error::Internal(format!(
                "series resolution returned {} results for {} clusters",
                resolved.len(),
                clusters.len()
            )));
        }
        telemetry::record_series_resolutions(keys.len() as u64);

        let batches = self.pending.batches_mut();
        for ((cluster, fingerprint), (_table_name, id)) in
            clusters.iter().zip(cluster_fingerprints).zip(resolved)
        {
            self.series_ids.insert(fingerprint, id);
            for &i in cluster {
                batches[i].resolve(id);
            }
        }
        Ok(())
    }

    /// Rows in the order batches and samples were appended.
    fn materialize_rows(&self) -> Result<Vec<SampleRow>> {
        let mut rows = Vec::with_capacity(self.pending.row_count());
        for batch in self.pending.batches() {
            let series_id = batch.series_id().ok_or_else(|| {
                Error::Internal("series id not resolved before copy".to_string())
            })?;
            for sample in batch.samples() {
                rows.push(SampleRow {
                    timestamp_ms: sample.timestamp_ms,
                    value: sample.value,
                    series_id,
                });
            }
        }
        Ok(rows)
    }
}

/// Assign cached ids to unresolved batches; returns how many remain
/// unresolved. Hits drop the batch's labels reference.
fn fill_known_series_ids(
    series_ids: &HashMap<String, SeriesId>,
    batches: &mut [SampleBatch],
) -> usize {
    let mut missing = 0;
    for batch in batches.iter_mut() {
        if batch.series_id().is_some() {
            continue;
        }
        let cached = match batch.labels() {
            Some(labels) => series_ids.get(labels.fingerprint()).copied(),
            None => None,
        };
        match cached {
            Some(id) => batch.resolve(id),
            None => missing += 1,
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sample;

    fn batch(labels: &[(&str, &str)], samples: usize) -> SampleBatch {
        let labels = Labels::new(
            labels
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        )
        .unwrap();
        SampleBatch::new(
            labels,
            (0..samples as i64)
                .map(|i| Sample {
                    timestamp_ms: i,
                    value: i as f64,
                })
                .collect(),
        )
    }

    #[test]
    fn fill_known_series_ids_resolves_cached_and_counts_missing() {
        let known = batch(&[("__name__", "m"), ("a", "1")], 1);
        let fingerprint = known.labels().unwrap().fingerprint().to_string();
        let mut cache = HashMap::new();
        cache.insert(fingerprint, SeriesId(42));

        let mut batches = vec![known, batch(&[("__name__", "m"), ("a", "2")], 1)];
        let missing = fill_known_series_ids(&cache, &mut batches);

        assert_eq!(missing, 1);
        assert_eq!(batches[0].series_id(), Some(SeriesId(42)));
        assert!(batches[0].labels().is_none(), "labels dropped on hit");
        assert!(batches[1].series_id().is_none());
    }
}
