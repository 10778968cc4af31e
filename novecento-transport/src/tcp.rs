//! TCP transport

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use novecento_core::constants::{DEFAULT_RECEIVE_BUFFER, DEFAULT_TIMEOUT};

use crate::{error::*, Transport};

/// TCP transport for acquisition units
///
/// The device accepts a single client. Responses and the sample stream
/// arrive on the same connection.
pub struct TcpTransport {
    addr: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    stream: Option<TcpStream>,
    connect_timeout: Duration,
    receive_buffer_size: usize,
}

impl TcpTransport {
    /// Create new TCP transport
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            socket_addr: None,
            stream: None,
            connect_timeout: Duration::from_secs(DEFAULT_TIMEOUT),
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER,
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the receive buffer requested before connecting
    pub fn with_receive_buffer_size(mut self, bytes: usize) -> Self {
        self.receive_buffer_size = bytes;
        self
    }

    /// Resolve address to SocketAddr
    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.socket_addr {
            return Ok(addr);
        }

        let addr_str = format!("{}:{}", self.addr, self.port);

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?
            .collect();

        let addr = addrs
            .first()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))?;

        self.socket_addr = Some(*addr);
        Ok(*addr)
    }

    fn socket_for(addr: &SocketAddr, receive_buffer_size: usize) -> Result<TcpSocket> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };

        // Sized before the handshake so the window scale covers the stream
        socket.set_recv_buffer_size(clamp_u32(receive_buffer_size))?;
        Ok(socket)
    }
}

fn clamp_u32(bytes: usize) -> u32 {
    u32::try_from(bytes).unwrap_or(u32::MAX)
}

fn grow_receive_buffer(stream: &std::net::TcpStream, bytes: usize) -> std::io::Result<usize> {
    // Options set through the duplicated descriptor apply to the same socket
    let socket = TcpSocket::from_std_stream(stream.try_clone()?);
    let current = socket.recv_buffer_size()? as usize;
    if current >= bytes {
        return Ok(current);
    }

    socket.set_recv_buffer_size(clamp_u32(bytes))?;
    Ok(socket.recv_buffer_size()? as usize)
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let addr = self.resolve_addr().await?;

        debug!("Connecting to {}...", addr);

        let socket = Self::socket_for(&addr, self.receive_buffer_size)?;
        let stream = timeout(self.connect_timeout, socket.connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(Error::Io)?;

        // Disable Nagle's algorithm so command frames go out immediately
        stream.set_nodelay(true)?;

        debug!("Connected to {}", addr);

        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Disconnecting from {}...", self.remote_addr());

            // Graceful shutdown
            let _ = stream.shutdown().await;
        }

        self.socket_addr = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        trace!("Sending {} bytes: {}", data.len(), hex::encode(&data[..data.len().min(16)]));

        stream.write_all(data).await?;
        stream.flush().await?;

        Ok(())
    }

    async fn receive(&mut self, max_len: usize, timeout_duration: Duration) -> Result<BytesMut> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let mut buf = BytesMut::zeroed(max_len);

        // Read with timeout
        let n = timeout(timeout_duration, stream.read(&mut buf))
            .await
            .map_err(|_| Error::ReadTimeout)?
            .map_err(Error::Io)?;

        if n == 0 {
            return Err(Error::ConnectionClosed);
        }

        buf.truncate(n);

        trace!("Received {} bytes: {}", n, hex::encode(&buf[..n.min(16)]));

        Ok(buf)
    }

    async fn receive_exact(&mut self, len: usize, timeout_duration: Duration) -> Result<BytesMut> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        if len == 0 {
            return Ok(BytesMut::new());
        }

        let mut buf = BytesMut::zeroed(len);
        let mut filled = 0;

        // Never read past `len`: whatever follows belongs to the next message
        let result = timeout(timeout_duration, async {
            while filled < len {
                let n = stream.read(&mut buf[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            Ok::<(), std::io::Error>(())
        })
        .await;

        match result {
            Err(_) => {
                warn!("Read timeout after {:?} ({} of {} bytes)", timeout_duration, filled, len);
                Err(Error::ReadTimeout)
            }
            Ok(Err(e)) => Err(Error::Io(e)),
            Ok(Ok(())) if filled == 0 => Err(Error::ConnectionClosed),
            Ok(Ok(())) if filled < len => Err(Error::ShortRead {
                expected: len,
                actual: filled,
            }),
            Ok(Ok(())) => {
                trace!("Received {} bytes: {}", len, hex::encode(&buf[..len.min(20)]));
                Ok(buf)
            }
        }
    }

    fn set_receive_buffer_size(&mut self, bytes: usize) -> Result<usize> {
        let stream = self.stream.take().ok_or(Error::NotConnected)?;
        let std_stream = stream.into_std()?;

        let granted = grow_receive_buffer(&std_stream, bytes);
        self.stream = Some(TcpStream::from_std(std_stream)?);
        let granted = granted?;

        if granted < bytes {
            warn!("Receive buffer limited to {} bytes ({} requested)", granted, bytes);
        } else {
            debug!("Receive buffer at {} bytes ({} requested)", granted, bytes);
        }

        self.receive_buffer_size = granted;
        Ok(granted)
    }

    fn remote_addr(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("TCP transport dropped while still connected");
        }
    }
}
