//! Channel-backed sample sink

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use novecento_core::{AuxSampleMatrix, SampleSink};

/// Delivers matrices into a bounded tokio channel
///
/// Never blocks the receive task: when the consumer falls behind the
/// matrix is dropped and counted. Once the receiver is gone every push
/// fails with `SinkClosed`, which ends the stream.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<AuxSampleMatrix>,
    dropped: Arc<AtomicU64>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<AuxSampleMatrix>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a sink and the receiver it feeds
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AuxSampleMatrix>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Matrices dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Shared handle to the drop counter, readable after the sink moved away
    pub fn drop_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }
}

impl SampleSink for ChannelSink {
    fn push(&mut self, matrix: AuxSampleMatrix) -> novecento_core::Result<()> {
        match self.tx.try_send(matrix) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(matrix)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "Sample queue full, dropped block {} ({} dropped so far)",
                    matrix.sequence(),
                    total
                );
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(novecento_core::Error::SinkClosed),
        }
    }
}
