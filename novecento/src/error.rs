//! High-level error types

use std::fmt;

use novecento_core::DeviceStatus;

pub type Result<T> = std::result::Result<T, Error>;

/// Negotiation step, reported when one fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    QueryFirmware,
    QueryBattery,
    QueryBaseline,
    SendConfiguration,
    QueryAccepted,
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::QueryFirmware => "firmware query",
            Self::QueryBattery => "battery query",
            Self::QueryBaseline => "baseline settings query",
            Self::SendConfiguration => "configuration frame",
            Self::QueryAccepted => "post-configuration settings query",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] novecento_core::Error),
    
    #[error("Transport error: {0}")]
    Transport(#[from] novecento_transport::Error),
    
    #[error("Handshake failed during {step}: {source}")]
    Handshake {
        step: HandshakeStep,
        #[source]
        source: novecento_transport::Error,
    },

    #[error("Device reported {status} during {step}")]
    DeviceStatus {
        step: HandshakeStep,
        status: DeviceStatus,
    },
    
    #[error("Device not connected")]
    NotConnected,

    #[error("Device not configured")]
    NotConfigured,

    #[error("Stream already running")]
    AlreadyStreaming,

    #[error("Stream not running")]
    NotStreaming,

    #[error("Receive task panicked")]
    ReceiverPanicked,
}

impl Error {
    pub(crate) fn handshake(step: HandshakeStep) -> impl FnOnce(novecento_transport::Error) -> Self {
        move |source| Self::Handshake { step, source }
    }

    /// Whether the connection is unusable after this error
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Transport(e) | Self::Handshake { source: e, .. } => e.is_disconnect(),
            Self::Core(e) => e.requires_reconnect(),
            Self::ReceiverPanicked => true,
            _ => false,
        }
    }
}
