//! Transport layer for the acquisition protocol
//!
//! Provides TCP communication with devices.

pub mod tcp;
pub mod error;

pub use error::{Error, Result};
pub use tcp::TcpTransport;

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;

/// Transport trait for different communication methods
///
/// Request/response exchanges and the sample stream share one connection;
/// only one task may read from it at a time.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to device
    async fn connect(&mut self) -> Result<()>;
    
    /// Disconnect from device
    async fn disconnect(&mut self) -> Result<()>;
    
    /// Check if connected
    fn is_connected(&self) -> bool;
    
    /// Send raw bytes
    async fn send(&mut self, data: &[u8]) -> Result<()>;
    
    /// Receive whatever is available, up to `max_len` bytes (with timeout)
    async fn receive(&mut self, max_len: usize, timeout: Duration) -> Result<BytesMut>;

    /// Receive exactly `len` bytes (with timeout)
    async fn receive_exact(&mut self, len: usize, timeout: Duration) -> Result<BytesMut>;

    /// Request an OS receive buffer of at least `bytes`
    ///
    /// A buffer that is already large enough is left alone. Returns the
    /// size in effect afterwards.
    fn set_receive_buffer_size(&mut self, bytes: usize) -> Result<usize>;
    
    /// Get remote address
    fn remote_addr(&self) -> String;
}
