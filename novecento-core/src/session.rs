//! Session management for the acquisition protocol
//!
//! A session represents a connection to a device and tracks:
//! - Lifecycle state (connected, configured, streaming)
//! - The negotiated packet geometry
//! - Blocks received since streaming started

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::geometry::PacketGeometry;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected
    Disconnected,

    /// Connected, no configuration accepted yet
    Connected,

    /// Configuration negotiated, geometry known
    Configured,

    /// Receive task running
    Streaming,
}

/// Session manager
///
/// Manages session state and the negotiated geometry.
/// Thread-safe and can be cloned cheaply (Arc internally).
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    /// Blocks delivered by the current stream
    blocks_received: AtomicU64,

    /// Current session state
    state: parking_lot::RwLock<SessionState>,

    /// Geometry from the last successful negotiation
    geometry: parking_lot::RwLock<Option<PacketGeometry>>,
}

impl Session {
    /// Create a new disconnected session
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SessionInner {
                blocks_received: AtomicU64::new(0),
                state: parking_lot::RwLock::new(SessionState::Disconnected),
                geometry: parking_lot::RwLock::new(None),
            }),
        }
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        !matches!(self.state(), SessionState::Disconnected)
    }

    /// Check if streaming
    pub fn is_streaming(&self) -> bool {
        matches!(self.state(), SessionState::Streaming)
    }

    /// Negotiated geometry, if any
    pub fn geometry(&self) -> Option<PacketGeometry> {
        self.inner.geometry.read().clone()
    }

    /// Mark the transport as connected
    pub fn initialize(&self) -> Result<()> {
        let mut state = self.inner.state.write();

        if *state != SessionState::Disconnected {
            return Err(Error::InvalidSessionState(
                format!("Cannot initialize from state: {:?}", *state)
            ));
        }

        *state = SessionState::Connected;
        Ok(())
    }

    /// Record a negotiated geometry
    ///
    /// Allowed again after a previous configuration, but not while streaming.
    pub fn configure(&self, geometry: PacketGeometry) -> Result<()> {
        let mut state = self.inner.state.write();

        if !matches!(*state, SessionState::Connected | SessionState::Configured) {
            return Err(Error::InvalidSessionState(
                format!("Cannot configure from state: {:?}", *state)
            ));
        }

        *self.inner.geometry.write() = Some(geometry);
        *state = SessionState::Configured;
        Ok(())
    }

    /// Enter the streaming state
    pub fn start_streaming(&self) -> Result<()> {
        let mut state = self.inner.state.write();

        if *state != SessionState::Configured {
            return Err(Error::InvalidSessionState(
                format!("Cannot start streaming from state: {:?}", *state)
            ));
        }

        self.inner.blocks_received.store(0, Ordering::Release);
        *state = SessionState::Streaming;
        Ok(())
    }

    /// Leave the streaming state
    pub fn stop_streaming(&self) -> Result<()> {
        let mut state = self.inner.state.write();

        if *state != SessionState::Streaming {
            return Err(Error::InvalidSessionState(
                format!("Cannot stop streaming from state: {:?}", *state)
            ));
        }

        *state = SessionState::Configured;
        Ok(())
    }

    /// Close session
    pub fn close(&self) {
        *self.inner.geometry.write() = None;
        *self.inner.state.write() = SessionState::Disconnected;
    }

    /// Count delivered blocks
    pub fn record_blocks(&self, count: u64) {
        self.inner.blocks_received.fetch_add(count, Ordering::AcqRel);
    }

    /// Blocks delivered since streaming started
    pub fn blocks_received(&self) -> u64 {
        self.inner.blocks_received.load(Ordering::Acquire)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
