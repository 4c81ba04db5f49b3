//! Ingestor for remote-write sample batches
//!
//! The ingestor fans each write request out to one long-lived writer task
//! per metric, discovered (or spawned) through a concurrent registry.
//! Completion is tracked with a latch sized to the number of metrics in
//! the request and a 1-capacity error sink that keeps the first failure.
//! In synchronous mode `insert` waits for the latch; in asynchronous mode
//! it returns immediately and a background task accounts for the outcome.

mod buffer;
mod completer;
mod telemetry;
mod writer;

use crate::cache::{MetricNameCache, DEFAULT_METRIC_CACHE_CAPACITY};
use crate::model::{SampleBatch, WriteRequest};
use crate::storage::Store;
use crate::{Error, Result};

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Bound on each per-metric mailbox, in requests. Producers block on a
/// full mailbox, which is the ingest path's backpressure.
pub(crate) const MAILBOX_CAPACITY: usize = 1000;

/// One request as it travels through a writer mailbox.
#[derive(Debug)]
pub(crate) struct InsertDataRequest {
    pub metric: String,
    pub batches: Vec<SampleBatch>,
    /// Latch share: dropped (never sent on) when the request completes.
    pub completion: mpsc::Sender<()>,
    /// First-error-wins sink shared by the whole write request.
    pub error_sink: mpsc::Sender<Error>,
}

/// Configuration for the ingestor
#[derive(Debug, Clone)]
pub struct IngestorConfig {
    /// Acknowledge writes before they are flushed to the store.
    pub async_acks: bool,
    /// With `async_acks`, log write throughput every this many seconds
    /// (0 disables the reporter).
    pub report_interval: u64,
    /// Capacity of the metric-name cache, in entries.
    pub metric_name_cache_capacity: u64,
}

impl Default for IngestorConfig {
    fn default() -> Self {
        Self {
            async_acks: false,
            report_interval: 0,
            metric_name_cache_capacity: DEFAULT_METRIC_CACHE_CAPACITY,
        }
    }
}

/// Fan-out ingestor over per-metric writer tasks.
pub struct Ingestor {
    store: Arc<dyn Store>,
    table_names: MetricNameCache,
    /// metric -> writer mailbox; the one authoritative writer registry
    inserters: DashMap<String, mpsc::Sender<InsertDataRequest>>,
    /// Taken on close so the completer channel can drain and stop.
    completer_signal: Mutex<Option<mpsc::Sender<()>>>,
    async_acks: bool,
    inserted_samples: Arc<AtomicU64>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl Ingestor {
    /// Build an ingestor over the given store.
    ///
    /// Runs one `finalize_metric_creation` up front to recover any metric
    /// creation interrupted before the last shutdown, then spawns the
    /// completer and, in async-ack mode with a report interval, the
    /// throughput reporter.
    pub async fn new(store: Arc<dyn Store>, config: IngestorConfig) -> Result<Self> {
        store.finalize_metric_creation().await?;

        let (signal_tx, signal_rx) = mpsc::channel(1);
        tokio::spawn(completer::run(store.clone(), signal_rx));

        let inserted_samples = Arc::new(AtomicU64::new(0));
        let shutdown = CancellationToken::new();
        if config.async_acks && config.report_interval > 0 {
            tokio::spawn(report_throughput(
                inserted_samples.clone(),
                config.report_interval,
                shutdown.clone(),
            ));
        }

        Ok(Self {
            store,
            table_names: MetricNameCache::new(config.metric_name_cache_capacity),
            inserters: DashMap::new(),
            completer_signal: Mutex::new(Some(signal_tx)),
            async_acks: config.async_acks,
            inserted_samples,
            closed: AtomicBool::new(false),
            shutdown,
        })
    }

    /// Ingest one write request.
    ///
    /// Returns the number of samples attempted and, in synchronous mode,
    /// the first error any writer reported for the request. The count is
    /// the attempted total even on error; the producer retries the whole
    /// request at the remote-write layer. In asynchronous mode the error
    /// slot is always `None` and failures are logged by a background task.
    pub async fn insert(&self, request: WriteRequest) -> (u64, Option<Error>) {
        let total_samples: u64 = request
            .values()
            .flatten()
            .map(|b| b.samples().len() as u64)
            .sum();
        if self.closed.load(Ordering::SeqCst) {
            return (total_samples, Some(Error::Closed));
        }
        telemetry::record_insert(total_samples);

        // Latch sized to the number of metrics: one sender clone rides
        // along with each per-metric request, and `recv` returns `None`
        // once every clone has dropped, whatever the outcome.
        let (done_tx, mut done_rx) = mpsc::channel::<()>(1);
        let (err_tx, mut err_rx) = mpsc::channel::<Error>(1);

        for (metric, batches) in request {
            let Some(mailbox) = self.metric_mailbox(&metric) else {
                let _ = err_tx.try_send(Error::Closed);
                continue;
            };
            let req = InsertDataRequest {
                metric,
                batches,
                completion: done_tx.clone(),
                error_sink: err_tx.clone(),
            };
            // May block on a full mailbox (backpressure). A send to a
            // closed mailbox drops the request, which still completes its
            // latch share.
            let _ = mailbox.send(req).await;
        }
        drop(done_tx);
        drop(err_tx);

        if !self.async_acks {
            while done_rx.recv().await.is_some() {}
            let error = err_rx.try_recv().ok();
            return (total_samples, error);
        }

        let inserted = self.inserted_samples.clone();
        tokio::spawn(async move {
            while done_rx.recv().await.is_some() {}
            match err_rx.try_recv() {
                Ok(e) => {
                    telemetry::record_dropped_samples(total_samples);
                    error!(error = %e, "error on async send, dropping {total_samples} datapoints");
                }
                Err(_) => {
                    inserted.fetch_add(total_samples, Ordering::Relaxed);
                }
            }
        });
        (total_samples, None)
    }

    /// Look up the mailbox for a metric, spawning the writer on first
    /// touch. The registry's entry API makes the get-or-spawn atomic:
    /// the loser of a concurrent first touch never spawns.
    fn metric_mailbox(&self, metric: &str) -> Option<mpsc::Sender<InsertDataRequest>> {
        if let Some(mailbox) = self.inserters.get(metric) {
            return Some(mailbox.clone());
        }
        let completer_signal = self.completer_signal.lock().clone()?;
        match self.inserters.entry(metric.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(e) => Some(e.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
                tokio::spawn(writer::run(
                    self.store.clone(),
                    metric.to_string(),
                    rx,
                    completer_signal,
                    self.table_names.clone(),
                ));
                telemetry::record_writer_spawned();
                Some(v.insert(tx).clone())
            }
        }
    }

    /// Number of live per-metric writers.
    pub fn writer_count(&self) -> usize {
        self.inserters.len()
    }

    /// Stop accepting inserts and shut the pipeline down.
    ///
    /// Dropping the mailbox senders lets every writer drain its in-flight
    /// requests and exit; the completer channel closes once the last
    /// writer drops its signal clone.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        *self.completer_signal.lock() = None;
        self.inserters.clear();
        self.shutdown.cancel();
        info!("ingestor closed");
    }
}

/// Periodic samples/sec log for async-ack mode.
async fn report_throughput(
    inserted: Arc<AtomicU64>,
    interval_secs: u64,
    shutdown: CancellationToken,
) {
    info!("reporting write throughput every {interval_secs}s");
    let mut tick = tokio::time::interval(Duration::from_secs(interval_secs));
    tick.tick().await; // first tick completes immediately
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let samples = inserted.swap(0, Ordering::Relaxed);
                info!(samples_per_sec = samples / interval_secs, "samples write throughput");
            }
            _ = shutdown.cancelled() => break,
        }
    }
}
