//! Fixed-size query responses
//!
//! Every query is answered with exactly 20 bytes. Byte 0 echoes the
//! command code; the meaning of the rest depends on the query.

use std::fmt;

use crate::{
    command::Command,
    constants::{RESPONSE_SIZE, SLOT_COUNT, channels_for_type, status},
    error::{Error, Result},
};

/// Status reported in the last byte of a settings response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// No error
    Ok,

    /// The device saw a checksum error in one of our frames
    ChecksumError,

    /// Any other non-zero status
    Other(u8),
}

impl DeviceStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Raw status byte
    pub fn code(self) -> u8 {
        match self {
            Self::Ok => status::OK,
            Self::ChecksumError => status::CHECKSUM_ERROR,
            Self::Other(code) => code,
        }
    }
}

impl From<u8> for DeviceStatus {
    fn from(code: u8) -> Self {
        match code {
            status::OK => Self::Ok,
            status::CHECKSUM_ERROR => Self::ChecksumError,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::ChecksumError => write!(f, "checksum error"),
            Self::Other(code) => write!(f, "error code {}", code),
        }
    }
}

/// Raw 20 byte response
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Response {
    bytes: [u8; RESPONSE_SIZE],
}

impl Response {
    /// Response size in bytes
    pub const SIZE: usize = RESPONSE_SIZE;

    /// Parse a response buffer
    ///
    /// # Errors
    ///
    /// Returns [`Error::PacketTooShort`] if fewer than 20 bytes are given.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::PacketTooShort {
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }

        let mut bytes = [0u8; Self::SIZE];
        bytes.copy_from_slice(&buf[..Self::SIZE]);
        Ok(Self { bytes })
    }

    /// Echoed command byte
    pub fn echo(&self) -> u8 {
        self.bytes[0]
    }

    /// Whether byte 0 echoes `command`
    pub fn echoes(&self, command: Command) -> bool {
        self.echo() == u8::from(command)
    }

    /// Payload after the echo byte
    pub fn payload(&self) -> &[u8] {
        &self.bytes[1..]
    }

    pub fn as_bytes(&self) -> &[u8; Self::SIZE] {
        &self.bytes
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("echo", &format!("0x{:02X}", self.echo()))
            .field("payload", &hex::encode(self.payload()))
            .finish()
    }
}

/// Response to [`Command::QuerySettings`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsResponse {
    response: Response,
}

impl SettingsResponse {
    const STATUS_INDEX: usize = RESPONSE_SIZE - 1;

    pub fn decode(buf: &[u8]) -> Result<Self> {
        Ok(Self {
            response: Response::decode(buf)?,
        })
    }

    /// Build a response from per-slot type codes and a status byte
    pub fn new(type_codes: [u8; SLOT_COUNT], status: u8) -> Self {
        let mut bytes = [0u8; RESPONSE_SIZE];
        bytes[0] = Command::QuerySettings.into();
        bytes[1..=SLOT_COUNT].copy_from_slice(&type_codes);
        bytes[Self::STATUS_INDEX] = status;
        Self {
            response: Response { bytes },
        }
    }

    /// Probe type code reported for every slot
    pub fn type_codes(&self) -> [u8; SLOT_COUNT] {
        let mut codes = [0u8; SLOT_COUNT];
        codes.copy_from_slice(&self.response.bytes[1..=SLOT_COUNT]);
        codes
    }

    /// Channels provided by the probe on `slot`
    pub fn sample_count(&self, slot: usize) -> usize {
        channels_for_type(self.response.bytes[1 + slot])
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus::from(self.response.bytes[Self::STATUS_INDEX])
    }

    pub fn raw(&self) -> &Response {
        &self.response
    }
}

/// Response to [`Command::QueryFirmware`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareResponse {
    response: Response,
}

impl FirmwareResponse {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        Ok(Self {
            response: Response::decode(buf)?,
        })
    }

    /// Opaque firmware identifier
    pub fn identifier(&self) -> &[u8] {
        self.response.payload()
    }

    pub fn raw(&self) -> &Response {
        &self.response
    }
}

/// Response to [`Command::QueryBattery`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryResponse {
    response: Response,
}

impl BatteryResponse {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        Ok(Self {
            response: Response::decode(buf)?,
        })
    }

    /// Battery level in percent
    pub fn percent(&self) -> u8 {
        self.response.bytes[1]
    }

    pub fn raw(&self) -> &Response {
        &self.response
    }
}
