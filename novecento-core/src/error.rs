//! Error types for novecento-core



/// Result type alias for novecento operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Frame is too short to be valid
    #[error("Packet too short: expected at least {expected} bytes, got {actual} bytes")]
    PacketTooShort {
        expected: usize,
        actual: usize,
    },

    /// Checksum verification failed
    #[error("Checksum mismatch: expected 0x{expected:02X}, received 0x{received:02X}")]
    ChecksumMismatch {
        expected: u8,
        received: u8,
    },

    /// Unknown command code
    #[error("Unknown command code: 0x{0:02X}")]
    UnknownCommand(u8),

    /// Configuration selector outside its lookup table
    #[error("Invalid {field} selector {value} on {} (max: {max})", slot_label(.slot))]
    InvalidSelector {
        field: &'static str,
        slot: Option<usize>,
        value: u8,
        max: u8,
    },

    /// More channel slots than the device has
    #[error("Too many channel slots: {count} (max: {max})")]
    TooManySlots {
        count: usize,
        max: usize,
    },

    /// A block must span at least one frame
    #[error("Frames per block must be at least 1")]
    InvalidFramesPerBlock,

    /// Geometry used before negotiation produced a block size
    #[error("Packet geometry not negotiated - configure the device first")]
    GeometryNotNegotiated,

    /// Decoded block has the wrong number of samples
    #[error("Malformed block: expected {expected} samples, got {actual}")]
    MalformedBlock {
        expected: usize,
        actual: usize,
    },

    /// Sample consumer went away
    #[error("Sample sink closed")]
    SinkClosed,

    /// Invalid session state
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),
}

fn slot_label(slot: &Option<usize>) -> String {
    match slot {
        Some(index) => format!("slot {}", index),
        None => "device".to_string(),
    }
}

impl Error {
    /// Check if error is recoverable (retry might succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedBlock { .. } | Self::ChecksumMismatch { .. }
        )
    }

    /// Check if error requires reconnection
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Self::GeometryNotNegotiated | Self::InvalidSessionState(_)
        )
    }
}
