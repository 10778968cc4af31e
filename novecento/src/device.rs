//! High-level device interface

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use novecento_core::{
    constants::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_READ_TIMEOUT, DEFAULT_TIMEOUT},
    AuxSampleMatrix, DecoderStats, DeviceConfig, PacketGeometry, SampleSink, Session,
    SessionState, StreamDecoder, DEFAULT_FRAMES_PER_BLOCK,
};
use novecento_transport::{TcpTransport, Transport};
use novecento_types::DeviceInfo;

use crate::error::{Error, Result};
use crate::handshake::{self, NegotiateOptions, Negotiated};
use crate::sink::ChannelSink;
use crate::stream::{spawn_receiver, ReceiverOptions, StreamHandle, DEFAULT_CHUNK_SIZE};

/// Acquisition unit
///
/// High-level interface: connect, negotiate a configuration, stream aux
/// samples, stop.
///
/// # Examples
///
/// ```no_run
/// use novecento::{ChannelSlot, Device, DeviceConfig};
///
/// #[tokio::main]
/// async fn main() -> novecento::Result<()> {
///     let mut device = Device::new("169.254.1.10", 23456);
///     device.connect().await?;
///
///     let config = DeviceConfig::new().with_slot(0, ChannelSlot::enabled());
///     let geometry = device.configure(&config).await?;
///     println!("{} bytes per block", geometry.block_byte_size());
///
///     let mut samples = device.start_streaming(16).await?;
///     if let Some(matrix) = samples.recv().await {
///         println!("{:?}", matrix);
///     }
///
///     device.stop_streaming().await?;
///     device.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct Device {
    host: String,
    port: u16,
    transport: Option<Box<dyn Transport>>,
    session: Session,
    timeout: Duration,
    read_timeout: Duration,
    frames_per_block: usize,
    chunk_size: usize,
    negotiated: Option<Negotiated>,
    needs_reconnect: bool,
    info: Option<DeviceInfo>,
    stream: Option<StreamHandle>,
    dropped: Option<Arc<AtomicU64>>,
}

impl Device {
    /// Create a new device instance (TCP transport)
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        Self {
            transport: Some(Box::new(TcpTransport::new(host.clone(), port))),
            host,
            port,
            session: Session::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT),
            frames_per_block: DEFAULT_FRAMES_PER_BLOCK,
            chunk_size: DEFAULT_CHUNK_SIZE,
            negotiated: None,
            needs_reconnect: false,
            info: None,
            stream: None,
            dropped: None,
        }
    }

    /// Use a custom transport instead of TCP
    pub fn with_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set response timeout for negotiation
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set idle timeout while streaming
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Frames grouped into one block (default: 1, one second of data)
    pub fn with_frames_per_block(mut self, frames: usize) -> Self {
        self.frames_per_block = frames;
        self
    }

    /// Largest single socket read while streaming
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes.max(1);
        self
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Check if streaming
    pub fn is_streaming(&self) -> bool {
        self.session.is_streaming()
    }

    /// Session state
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Device information from the last negotiation
    pub fn info(&self) -> Option<&DeviceInfo> {
        self.info.as_ref()
    }

    /// Geometry from the last negotiation
    pub fn geometry(&self) -> Option<PacketGeometry> {
        self.session.geometry()
    }

    /// Blocks delivered since streaming started
    pub fn blocks_received(&self) -> u64 {
        self.session.blocks_received()
    }

    /// Matrices dropped by the channel sink since streaming started
    pub fn blocks_dropped(&self) -> u64 {
        self.dropped
            .as_ref()
            .map_or(0, |counter| counter.load(Ordering::Relaxed))
    }

    /// Connect to device
    pub async fn connect(&mut self) -> Result<()> {
        let (host, port) = (self.host.clone(), self.port);
        let transport = self
            .transport
            .get_or_insert_with(|| -> Box<dyn Transport> { Box::new(TcpTransport::new(host, port)) });

        info!("Connecting to {}...", transport.remote_addr());

        transport.connect().await?;
        self.session.initialize()?;

        info!("Connected");
        Ok(())
    }

    /// Negotiate a configuration
    ///
    /// The device starts streaming as soon as it accepts the configuration.
    /// Configuring again, or after a failed negotiation, reconnects first so
    /// leftover stream data never reaches the query responses.
    pub async fn configure(&mut self, config: &DeviceConfig) -> Result<PacketGeometry> {
        let configured = match self.session.state() {
            SessionState::Disconnected => return Err(Error::NotConnected),
            SessionState::Streaming => return Err(Error::AlreadyStreaming),
            SessionState::Configured => true,
            SessionState::Connected => false,
        };
        if configured || self.needs_reconnect {
            self.reconnect().await?;
        }

        let options = NegotiateOptions {
            frames_per_block: self.frames_per_block,
            response_timeout: self.timeout,
        };

        let transport = self.transport_mut()?;
        let negotiated = match handshake::negotiate(transport, config, &options).await {
            Ok(negotiated) => negotiated,
            Err(e) => {
                // Partial replies or stream data may still be in flight
                self.needs_reconnect = true;
                return Err(e);
            }
        };

        let geometry = negotiated.geometry.clone();
        self.session.configure(geometry.clone())?;
        self.info = Some(negotiated.info.clone());
        self.negotiated = Some(negotiated);

        Ok(geometry)
    }

    /// Start streaming into a bounded channel
    ///
    /// Matrices are dropped (and counted) when the receiver falls more than
    /// `capacity` blocks behind.
    pub async fn start_streaming(
        &mut self,
        capacity: usize,
    ) -> Result<mpsc::Receiver<AuxSampleMatrix>> {
        let (sink, rx) = ChannelSink::channel(capacity.max(1));
        let dropped = sink.drop_counter();

        self.start_streaming_with_sink(sink).await?;
        self.dropped = Some(dropped);

        Ok(rx)
    }

    /// Start streaming into a custom sink
    ///
    /// Each negotiation allows one stream: after stopping, configure again.
    pub async fn start_streaming_with_sink<S>(&mut self, sink: S) -> Result<()>
    where
        S: SampleSink + 'static,
    {
        match self.session.state() {
            SessionState::Disconnected => return Err(Error::NotConnected),
            SessionState::Streaming => return Err(Error::AlreadyStreaming),
            SessionState::Connected => return Err(Error::NotConfigured),
            SessionState::Configured => {}
        }

        let negotiated = self.negotiated.take().ok_or(Error::NotConfigured)?;
        let decoder = StreamDecoder::new(negotiated.geometry, sink)?;
        let transport = self.transport.take().ok_or(Error::NotConnected)?;

        self.session.start_streaming()?;
        self.dropped = None;

        let options = ReceiverOptions {
            chunk_size: self.chunk_size,
            read_timeout: self.read_timeout,
            session: Some(self.session.clone()),
        };
        self.stream = Some(spawn_receiver(transport, decoder, options));

        Ok(())
    }

    /// Stop streaming
    ///
    /// Stops the receive task, then tells the device to stop. Returns the
    /// decoder counters, or the error that ended the stream early.
    pub async fn stop_streaming(&mut self) -> Result<DecoderStats> {
        let handle = self.stream.take().ok_or(Error::NotStreaming)?;

        let outcome = match handle.stop().await {
            Ok(outcome) => outcome,
            Err(e) => {
                // The transport went down with the task
                self.session.close();
                return Err(e);
            }
        };

        let mut transport = outcome.transport;
        handshake::send_stop(transport.as_mut()).await;
        self.transport = Some(transport);
        self.session.stop_streaming()?;

        match outcome.result {
            Ok(()) | Err(Error::Core(novecento_core::Error::SinkClosed)) => Ok(outcome.stats),
            Err(e) => Err(e),
        }
    }

    /// Disconnect from device
    pub async fn disconnect(&mut self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }

        if self.stream.is_some() {
            if let Err(e) = self.stop_streaming().await {
                warn!("Stream ended with error: {}", e);
            }
        } else if self.negotiated.is_some() || self.needs_reconnect {
            // Configured but never streamed, or a negotiation failed midway
            if let Some(transport) = self.transport.as_mut() {
                handshake::send_stop(transport.as_mut()).await;
            }
        }

        if let Some(transport) = self.transport.as_mut() {
            info!("Disconnecting from {}...", transport.remote_addr());
            transport.disconnect().await?;
        }

        self.negotiated = None;
        self.needs_reconnect = false;
        self.session.close();

        info!("Disconnected");
        Ok(())
    }

    // Helper methods

    async fn reconnect(&mut self) -> Result<()> {
        debug!("Reconnecting before reconfiguration");

        let transport = self.transport_mut()?;
        handshake::send_stop(transport).await;
        transport.disconnect().await?;
        transport.connect().await?;

        self.negotiated = None;
        self.needs_reconnect = false;
        self.session.close();
        self.session.initialize()?;
        Ok(())
    }

    fn transport_mut(&mut self) -> Result<&mut dyn Transport> {
        match self.transport.as_mut() {
            Some(transport) => Ok(transport.as_mut()),
            None => Err(Error::NotConnected),
        }
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}
