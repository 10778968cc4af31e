//! Device query commands

use std::fmt;

use crate::{
    checksum,
    error::{Error, Result},
};

/// Query command codes
///
/// Each query is sent as a two byte frame `[code, checksum(code)]` and
/// answered with a fixed 20 byte response.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Read the probe configuration and device status
    QuerySettings = 0x01,

    /// Read the firmware identifier
    QueryFirmware = 0x02,

    /// Read the battery level
    QueryBattery = 0x03,
}

impl Command {
    /// Size of an encoded command frame
    pub const FRAME_SIZE: usize = 2;

    /// Encode the command frame
    ///
    /// # Examples
    ///
    /// ```
    /// use novecento_core::Command;
    ///
    /// assert_eq!(Command::QuerySettings.frame(), [0x01, 0x5E]);
    /// ```
    pub fn frame(self) -> [u8; Self::FRAME_SIZE] {
        let code = self as u8;
        [code, checksum::calculate(&[code])]
    }

    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::QuerySettings => "QUERY_SETTINGS",
            Self::QueryFirmware => "QUERY_FIRMWARE",
            Self::QueryBattery => "QUERY_BATTERY",
        }
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> u8 {
        cmd as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::QuerySettings),
            0x02 => Ok(Self::QueryFirmware),
            0x03 => Ok(Self::QueryBattery),
            _ => Err(Error::UnknownCommand(value)),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}
