//! Ingest telemetry instruments and recording helpers.

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};
use std::sync::OnceLock;

struct IngestInstruments {
    insert_requests: Counter<u64>,
    insert_samples: Counter<u64>,
    dropped_samples: Counter<u64>,
    flush_duration_seconds: Histogram<f64>,
    flush_rows: Histogram<u64>,
    flush_failures: Counter<u64>,
    series_resolutions: Counter<u64>,
    writers_spawned: Counter<u64>,
}

fn instruments() -> &'static IngestInstruments {
    static INSTRUMENTS: OnceLock<IngestInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("promgres.ingestor");
        IngestInstruments {
            insert_requests: meter
                .u64_counter("promgres.ingestor.insert.requests")
                .with_description("Write requests accepted by the ingestor")
                .init(),
            insert_samples: meter
                .u64_counter("promgres.ingestor.insert.samples")
                .with_description("Samples accepted by the ingestor")
                .init(),
            dropped_samples: meter
                .u64_counter("promgres.ingestor.insert.dropped_samples")
                .with_description("Samples dropped after an async-ack failure")
                .init(),
            flush_duration_seconds: meter
                .f64_histogram("promgres.ingestor.flush.duration")
                .with_description("Flush duration")
                .with_unit("s")
                .init(),
            flush_rows: meter
                .u64_histogram("promgres.ingestor.flush.rows")
                .with_description("Rows written per flush")
                .init(),
            flush_failures: meter
                .u64_counter("promgres.ingestor.flush.failures")
                .with_description("Flushes that failed and errored their requests")
                .init(),
            series_resolutions: meter
                .u64_counter("promgres.ingestor.series.resolutions")
                .with_description("Series-id stored-routine calls issued")
                .init(),
            writers_spawned: meter
                .u64_counter("promgres.ingestor.writers.spawned")
                .with_description("Per-metric writer tasks spawned")
                .init(),
        }
    })
}

pub(crate) fn record_insert(samples: u64) {
    let i = instruments();
    i.insert_requests.add(1, &[]);
    i.insert_samples.add(samples, &[]);
}

pub(crate) fn record_dropped_samples(samples: u64) {
    instruments().dropped_samples.add(samples, &[]);
}

pub(crate) fn record_flush(duration_seconds: f64, rows: u64) {
    let i = instruments();
    i.flush_duration_seconds.record(duration_seconds, &[]);
    i.flush_rows.record(rows, &[]);
}

pub(crate) fn record_flush_failure() {
    instruments().flush_failures.add(1, &[]);
}

pub(crate) fn record_series_resolutions(calls: u64) {
    instruments().series_resolutions.add(calls, &[]);
}

pub(crate) fn record_writer_spawned() {
    instruments().writers_spawned.add(1, &[]);
}
