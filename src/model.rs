//! Core data model for the ingest path

use crate::labels::Labels;
use std::collections::HashMap;

/// A single measurement: milliseconds since the Unix epoch and a value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp_ms: i64,
    pub value: f64,
}

/// Store-assigned integer key for a series; stable for the lifetime of the
/// store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesId(pub i64);

impl std::fmt::Display for SeriesId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Samples for one series within one write request.
///
/// `series_id` starts unresolved and transitions exactly once via
/// [`SampleBatch::resolve`]; after that the id is immutable and the labels
/// are released.
#[derive(Debug, Clone)]
pub struct SampleBatch {
    labels: Option<Labels>,
    series_id: Option<SeriesId>,
    samples: Vec<Sample>,
}

impl SampleBatch {
    pub fn new(labels: Labels, samples: Vec<Sample>) -> Self {
        Self {
            labels: Some(labels),
            series_id: None,
            samples,
        }
    }

    /// The canonical labels, present until the series id is resolved.
    pub fn labels(&self) -> Option<&Labels> {
        self.labels.as_ref()
    }

    pub fn series_id(&self) -> Option<SeriesId> {
        self.series_id
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Assign the series id and drop the labels reference.
    ///
    /// A second call is a no-op: once resolved the id never changes.
    pub(crate) fn resolve(&mut self, id: SeriesId) {
        if self.series_id.is_none() {
            self.series_id = Some(id);
            self.labels = None;
        }
    }
}

/// A write request as handed to the ingestor: metric name → batches.
pub type WriteRequest = HashMap<String, Vec<SampleBatch>>;
