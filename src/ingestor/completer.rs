//! Metric-creation completer
//!
//! One background task owns a 1-capacity signal channel. Writers that
//! observe a possibly-new metric table try-send a token; a full channel
//! means a finalization is already due and the token is dropped. Each
//! received token turns into one `finalize_metric_creation` call, so a
//! burst of new metrics costs at most one call per in-flight completion.

use crate::storage::Store;

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub(crate) async fn run(store: Arc<dyn Store>, mut signal: mpsc::Receiver<()>) {
    while signal.recv().await.is_some() {
        // Errors are discarded: the routine is idempotent and the next
        // successful call catches up.
        if let Err(e) = store.finalize_metric_creation().await {
            warn!(error = %e, "error finalizing metric creation");
        }
    }
    debug!("metric-creation completer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;
    use std::time::Duration;

    #[tokio::test]
    async fn each_token_finalizes_once() {
        let store = Arc::new(LocalStore::new());
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(run(store.clone(), rx));

        tx.send(()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.finalize_count(), 1);

        drop(tx);
        handle.await.unwrap();
        assert_eq!(store.finalize_count(), 1);
    }

    #[test]
    fn tokens_drop_when_a_completion_is_already_pending() {
        let (tx, _rx) = mpsc::channel::<()>(1);
        assert!(tx.try_send(()).is_ok());
        assert!(tx.try_send(()).is_err(), "second token is coalesced away");
    }
}
