//! Pending buffer for a per-metric writer
//!
//! Accumulates the batches and completion tasks of enqueued requests
//! between flushes. The pending row count is the sum of sample counts
//! across buffered batches; crossing `FLUSH_SIZE` or letting the oldest
//! task wait past `FLUSH_TIMEOUT` triggers a flush.

use super::InsertDataRequest;
use crate::model::SampleBatch;
use crate::Error;

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Pending rows above which a flush is due.
pub(crate) const FLUSH_SIZE: usize = 2000;
/// Upper bound on how long buffered rows may wait for more traffic.
pub(crate) const FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// Completion bookkeeping for one enqueued request.
///
/// The completion sender is never sent on; dropping it is the decrement.
/// That makes latch completion unconditional: success, failure, and writer
/// death all end with the task being dropped.
#[derive(Debug)]
pub(crate) struct InsertDataTask {
    _completion: mpsc::Sender<()>,
    error_sink: mpsc::Sender<Error>,
}

/// Per-writer accumulator of tasks and sample batches.
#[derive(Debug, Default)]
pub(crate) struct PendingBuffer {
    tasks: Vec<InsertDataTask>,
    batches: Vec<SampleBatch>,
    row_count: usize,
    oldest_pending: Option<Instant>,
}

impl PendingBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Attach a request's batches and completion task. Returns true when
    /// the pending row count now exceeds [`FLUSH_SIZE`].
    pub(crate) fn add_req(&mut self, req: InsertDataRequest) -> bool {
        self.tasks.push(InsertDataTask {
            _completion: req.completion,
            error_sink: req.error_sink,
        });
        self.row_count += req
            .batches
            .iter()
            .map(|b| b.samples().len())
            .sum::<usize>();
        self.batches.extend(req.batches);
        self.oldest_pending.get_or_insert_with(Instant::now);
        self.row_count > FLUSH_SIZE
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.batches.is_empty() && self.tasks.is_empty()
    }

    pub(crate) fn row_count(&self) -> usize {
        self.row_count
    }

    /// Instant past which the oldest pending task has waited too long.
    pub(crate) fn staleness_deadline(&self) -> Option<Instant> {
        self.oldest_pending.map(|t| t + FLUSH_TIMEOUT)
    }

    pub(crate) fn batches(&self) -> &[SampleBatch] {
        &self.batches
    }

    pub(crate) fn batches_mut(&mut self) -> &mut [SampleBatch] {
        &mut self.batches
    }

    /// Deliver the flush outcome to every attached task and reset the
    /// buffer, retaining capacity.
    ///
    /// On failure each task's error sink gets a clone of the same error
    /// (try-send: the 1-capacity sink keeps the first error, later sends
    /// drop). Every task's completion handle drops regardless of outcome.
    pub(crate) fn complete(&mut self, error: Option<&Error>) {
        for task in self.tasks.drain(..) {
            if let Some(e) = error {
                let _ = task.error_sink.try_send(e.clone());
            }
        }
        self.batches.clear();
        self.row_count = 0;
        self.oldest_pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::Labels;
    use crate::model::Sample;

    fn request(samples_per_batch: &[usize]) -> (InsertDataRequest, mpsc::Receiver<Error>) {
        let (done_tx, _done_rx) = mpsc::channel(1);
        let (err_tx, err_rx) = mpsc::channel(1);
        let labels = Labels::new(vec![("__name__".to_string(), "m".to_string())]).unwrap();
        let batches = samples_per_batch
            .iter()
            .map(|&n| {
                SampleBatch::new(
                    labels.clone(),
                    (0..n as i64)
                        .map(|i| Sample {
                            timestamp_ms: i,
                            value: i as f64,
                        })
                        .collect(),
                )
            })
            .collect();
        (
            InsertDataRequest {
                metric: "m".to_string(),
                batches,
                completion: done_tx,
                error_sink: err_tx,
            },
            err_rx,
        )
    }

    #[test]
    fn row_count_sums_samples_across_batches() {
        let mut buffer = PendingBuffer::new();
        assert!(buffer.is_empty());

        let (req, _err_rx) = request(&[3, 2]);
        assert!(!buffer.add_req(req), "5 rows should not trigger a flush");
        assert_eq!(buffer.row_count(), 5);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn flush_needed_strictly_above_flush_size() {
        let mut buffer = PendingBuffer::new();
        let (req, _err_rx) = request(&[FLUSH_SIZE]);
        assert!(!buffer.add_req(req), "exactly FLUSH_SIZE rows is not over");

        let (req, _err_rx2) = request(&[1]);
        assert!(buffer.add_req(req), "one more row crosses the threshold");
    }

    #[test]
    fn complete_delivers_first_error_and_resets() {
        let mut buffer = PendingBuffer::new();
        let (req_a, mut err_a) = request(&[1]);
        let (req_b, mut err_b) = request(&[1]);
        buffer.add_req(req_a);
        buffer.add_req(req_b);

        let failure = Error::Storage("copy failed".to_string());
        buffer.complete(Some(&failure));

        assert_eq!(err_a.try_recv().unwrap(), failure);
        assert_eq!(err_b.try_recv().unwrap(), failure);
        assert!(buffer.is_empty());
        assert_eq!(buffer.row_count(), 0);
        assert!(buffer.staleness_deadline().is_none());
    }

    #[test]
    fn complete_without_error_sends_nothing() {
        let mut buffer = PendingBuffer::new();
        let (req, mut err_rx) = request(&[2]);
        buffer.add_req(req);
        buffer.complete(None);
        assert!(err_rx.try_recv().is_err());
        assert!(buffer.is_empty());
    }
}
