//! # novecento
//!
//! Async client for Novecento-class bioelectric acquisition units.
//!
//! ## Features
//!
//! - Checksummed configuration frames built from typed settings
//! - Negotiation that derives the exact stream geometry
//! - A receive task decoding the stream into aux sample matrices in volts
//! - Async/await API using Tokio
//!
//! ## Quick Start
//!
//! ```no_run
//! use novecento::{Device, DeviceConfig, SampleRate};
//!
//! #[tokio::main]
//! async fn main() -> novecento::Result<()> {
//!     // Connect to device
//!     let mut device = Device::new("169.254.1.10", 23456);
//!     device.connect().await?;
//!
//!     // Negotiate and stream
//!     let config = DeviceConfig::new().with_aux_rate(SampleRate::Hz2000);
//!     device.configure(&config).await?;
//!     let mut samples = device.start_streaming(8).await?;
//!
//!     while let Some(matrix) = samples.recv().await {
//!         println!("block {}: {:?}", matrix.sequence(), matrix.get(0, 0));
//!         break;
//!     }
//!
//!     // Stop and disconnect
//!     device.stop_streaming().await?;
//!     device.disconnect().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod device;
pub mod error;
pub mod handshake;
pub mod sink;
pub mod stream;

#[cfg(test)]
mod testing;

// Re-exports
pub use device::Device;
pub use error::{Error, HandshakeStep, Result};
pub use handshake::{negotiate, send_stop, NegotiateOptions, Negotiated};
pub use sink::ChannelSink;
pub use stream::{spawn_receiver, ReceiverOptions, StreamHandle, StreamOutcome};

// Re-export types
pub use novecento_core::{
    AnalogOutput, AuxSampleMatrix, ChannelSlot, DecoderStats, DeviceConfig, PacketGeometry,
    SampleRate, SampleSink, Session, SessionState, StreamDecoder,
};
pub use novecento_transport::{TcpTransport, Transport};
pub use novecento_types::DeviceInfo;
