//! Receive task
//!
//! Once negotiation finishes the device streams blocks until it gets the
//! stop frame. A single task owns the transport for that whole time, reads
//! chunks and feeds them to a [`StreamDecoder`].

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use novecento_core::{
    constants::DEFAULT_READ_TIMEOUT, DecoderStats, SampleSink, Session, StreamDecoder,
};
use novecento_transport::Transport;

use crate::error::{Error, Result};

/// Default size of a single read from the socket
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Receive loop options
#[derive(Debug, Clone)]
pub struct ReceiverOptions {
    /// Largest read handed to the decoder at once
    pub chunk_size: usize,

    /// Idle time after which a warning is logged
    pub read_timeout: Duration,

    /// Session whose block counter is updated
    pub session: Option<Session>,
}

impl Default for ReceiverOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT),
            session: None,
        }
    }
}

/// What the receive task hands back when it ends
pub struct StreamOutcome {
    /// The transport, still connected unless the stream failed
    pub transport: Box<dyn Transport>,

    /// Decoder counters at the end of the stream
    pub stats: DecoderStats,

    /// `Ok` after a requested stop, the terminal error otherwise
    pub result: Result<()>,
}

/// Handle to a running receive task
pub struct StreamHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<StreamOutcome>,
}

impl StreamHandle {
    /// Whether the task already ended on its own
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop the task and wait for it
    ///
    /// A read in progress is abandoned. The stop frame is not sent here;
    /// the caller gets the transport back to do that.
    pub async fn stop(self) -> Result<StreamOutcome> {
        // Fails only if the task already ended
        let _ = self.stop_tx.send(true);
        self.join.await.map_err(|e| {
            warn!("Receive task failed: {}", e);
            Error::ReceiverPanicked
        })
    }
}

/// Spawn the receive task on the current runtime
///
/// A `chunk_size` of 0 is treated as 1.
pub fn spawn_receiver<S>(
    transport: Box<dyn Transport>,
    decoder: StreamDecoder<S>,
    mut options: ReceiverOptions,
) -> StreamHandle
where
    S: SampleSink + 'static,
{
    options.chunk_size = options.chunk_size.max(1);

    let (stop_tx, stop_rx) = watch::channel(false);
    let join = tokio::spawn(receive_loop(transport, decoder, options, stop_rx));
    StreamHandle { stop_tx, join }
}

async fn receive_loop<S: SampleSink>(
    mut transport: Box<dyn Transport>,
    mut decoder: StreamDecoder<S>,
    options: ReceiverOptions,
    mut stop_rx: watch::Receiver<bool>,
) -> StreamOutcome {
    info!(
        "Streaming from {} ({} bytes per block)",
        transport.remote_addr(),
        decoder.geometry().block_byte_size()
    );

    let result: Result<()> = loop {
        tokio::select! {
            biased;

            // A dropped handle counts as a stop request
            _ = stop_rx.changed() => {
                debug!("Stop requested");
                break Ok(());
            }

            read = transport.receive(options.chunk_size, options.read_timeout) => match read {
                Ok(chunk) => match decoder.feed(&chunk) {
                    Ok(0) => {}
                    Ok(emitted) => {
                        if let Some(session) = &options.session {
                            session.record_blocks(emitted as u64);
                        }
                    }
                    Err(e) => break Err(e.into()),
                },
                Err(novecento_transport::Error::ReadTimeout) => {
                    warn!("No stream data for {:?}", options.read_timeout);
                }
                Err(e) => break Err(e.into()),
            },
        }
    };

    let stats = decoder.stats();
    match &result {
        Ok(()) => info!(
            "Stream stopped after {} blocks ({} malformed)",
            stats.blocks_decoded, stats.blocks_malformed
        ),
        Err(e) => warn!("Stream ended after {} blocks: {}", stats.blocks_decoded, e),
    }

    StreamOutcome {
        transport,
        stats,
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use novecento_core::{AuxSampleMatrix, PacketGeometry, SampleRate};
    use std::sync::{Arc, Mutex};

    fn geometry() -> PacketGeometry {
        PacketGeometry::new([0; 10], SampleRate::Hz500, 1).unwrap()
    }

    fn collecting_decoder() -> (StreamDecoder<impl SampleSink>, Arc<Mutex<Vec<u64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let decoder = StreamDecoder::new(geometry(), move |m: AuxSampleMatrix| {
            sink_seen.lock().unwrap().push(m.sequence());
        })
        .unwrap();
        (decoder, seen)
    }

    #[tokio::test]
    async fn test_stream_until_closed() {
        let block = geometry().block_byte_size();
        let transport = ScriptedTransport::new()
            .with_reply(vec![0u8; block + 10])
            .with_timeout()
            .with_reply(vec![0u8; block - 10]);

        let (decoder, seen) = collecting_decoder();
        let session = Session::new();
        session.initialize().unwrap();
        session.configure(geometry()).unwrap();
        session.start_streaming().unwrap();

        let options = ReceiverOptions {
            chunk_size: 4096,
            session: Some(session.clone()),
            ..ReceiverOptions::default()
        };
        let handle = spawn_receiver(Box::new(transport), decoder, options);
        let outcome = handle.stop_when_finished().await;

        // Script exhausted: the connection reads as closed
        assert!(matches!(
            outcome.result,
            Err(Error::Transport(novecento_transport::Error::ConnectionClosed))
        ));
        assert_eq!(outcome.stats.blocks_decoded, 2);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
        assert_eq!(session.blocks_received(), 2);
    }

    #[tokio::test]
    async fn test_zero_chunk_size_still_reads() {
        let block = geometry().block_byte_size();
        let transport = ScriptedTransport::new().with_reply(vec![0u8; block]);

        let (decoder, seen) = collecting_decoder();
        let options = ReceiverOptions {
            chunk_size: 0,
            ..ReceiverOptions::default()
        };
        let outcome = spawn_receiver(Box::new(transport), decoder, options)
            .stop_when_finished()
            .await;

        // Ends when the script runs out, not on the first read
        assert!(matches!(
            outcome.result,
            Err(Error::Transport(novecento_transport::Error::ConnectionClosed))
        ));
        assert_eq!(outcome.stats.blocks_decoded, 1);
        assert_eq!(*seen.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_stop_preempts_pending_read() {
        let (decoder, _seen) = collecting_decoder();
        let handle = spawn_receiver(Box::new(PendingTransport), decoder, ReceiverOptions::default());

        let outcome = handle.stop().await.unwrap();
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.stats.blocks_decoded, 0);
        assert!(outcome.transport.is_connected());
    }

    #[tokio::test]
    async fn test_closed_sink_ends_stream() {
        let block = geometry().block_byte_size();
        let transport = ScriptedTransport::new().with_reply(vec![0u8; block]);

        let (sink, rx) = crate::sink::ChannelSink::channel(1);
        drop(rx);
        let decoder = StreamDecoder::new(geometry(), sink).unwrap();

        let outcome = spawn_receiver(Box::new(transport), decoder, ReceiverOptions::default())
            .stop_when_finished()
            .await;

        assert!(matches!(
            outcome.result,
            Err(Error::Core(novecento_core::Error::SinkClosed))
        ));
    }

    impl StreamHandle {
        async fn stop_when_finished(self) -> StreamOutcome {
            self.join.await.unwrap()
        }
    }

    /// Never yields data
    struct PendingTransport;

    #[async_trait::async_trait]
    impl Transport for PendingTransport {
        async fn connect(&mut self) -> novecento_transport::Result<()> {
            Ok(())
        }

        async fn disconnect(&mut self) -> novecento_transport::Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }

        async fn send(&mut self, _data: &[u8]) -> novecento_transport::Result<()> {
            Ok(())
        }

        async fn receive(
            &mut self,
            _max_len: usize,
            _timeout: Duration,
        ) -> novecento_transport::Result<bytes::BytesMut> {
            std::future::pending().await
        }

        async fn receive_exact(
            &mut self,
            _len: usize,
            _timeout: Duration,
        ) -> novecento_transport::Result<bytes::BytesMut> {
            std::future::pending().await
        }

        fn set_receive_buffer_size(&mut self, bytes: usize) -> novecento_transport::Result<usize> {
            Ok(bytes)
        }

        fn remote_addr(&self) -> String {
            "pending".to_string()
        }
    }
}
