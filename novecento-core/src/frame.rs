//! Configuration frame encoding/decoding

use std::fmt;

use bitflags::bitflags;
use bytes::{BufMut, BytesMut};

use crate::{
    checksum,
    config::{AnalogOutput, ChannelSlot, DeviceConfig},
    constants::{AUX_RATE_CODES, CONFIG_FRAME_SIZE, SLOT_COUNT},
    error::{Error, Result},
};

bitflags! {
    /// Control bits carried in byte 0 alongside the aux rate code
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControlFlags: u8 {
        /// Activation bit of slot 8
        const SLOT_8 = 0b0000_0001;
        /// Activation bit of slot 9
        const SLOT_9 = 0b0000_0010;
        /// Start streaming once the frame is accepted
        const STREAM = 0b1000_0000;
    }
}

const AUX_RATE_MASK: u8 = 0b0011_0000;

/// 15 byte configuration frame
///
/// # Frame Structure
///
/// ```text
/// ┌────────┬──────────┬──────────┬──────────┬──────────────┬──────────┐
/// │ byte 0 │  byte 1  │  byte 2  │  byte 3  │  bytes 4-13  │ byte 14  │
/// │control │ slot 0-7 │ analog   │ analog   │ one byte per │ checksum │
/// │+aux fs │ bitmask  │gain|src  │ channel  │ slot 0-9     │ (CRC-8)  │
/// └────────┴──────────┴──────────┴──────────┴──────────────┴──────────┘
/// ```
///
/// Byte 0 is `0x80 | aux_rate * 16 | 2 * active[9] + active[8]`.
/// Each slot byte is `mode * 64 + gain * 16 + high_pass * 8 + hi_res * 4 + rate`.
///
/// # Examples
///
/// ```
/// use novecento_core::{ChannelSlot, ConfigFrame, DeviceConfig, checksum};
///
/// let config = DeviceConfig::new().with_slot(0, ChannelSlot::enabled());
/// let frame = ConfigFrame::encode(&config).unwrap();
///
/// assert_eq!(frame.as_bytes().len(), 15);
/// assert!(checksum::verify(frame.as_bytes()));
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ConfigFrame {
    bytes: [u8; CONFIG_FRAME_SIZE],
}

impl ConfigFrame {
    /// Frame size in bytes
    pub const SIZE: usize = CONFIG_FRAME_SIZE;

    /// Offset of the first slot byte
    const SLOT_OFFSET: usize = 4;

    /// Encode a configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSelector`] if any selector is outside its table.
    pub fn encode(config: &DeviceConfig) -> Result<Self> {
        config.validate()?;

        let mut buf = BytesMut::with_capacity(Self::SIZE);

        let mut flags = ControlFlags::STREAM;
        flags.set(ControlFlags::SLOT_8, config.slots[8].active);
        flags.set(ControlFlags::SLOT_9, config.slots[9].active);
        buf.put_u8(flags.bits() | AUX_RATE_CODES[config.aux_rate as usize]);

        let mask = config.slots[..8]
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.active)
            .fold(0u8, |mask, (i, _)| mask | (1 << i));
        buf.put_u8(mask);

        let output = &config.analog_output;
        buf.put_u8((output.gain << 4) | output.source);
        buf.put_u8(output.channel);

        for slot in &config.slots {
            buf.put_u8(encode_slot(slot));
        }

        buf.put_u8(checksum::calculate(&buf));

        let mut bytes = [0u8; Self::SIZE];
        bytes.copy_from_slice(&buf);
        Ok(Self { bytes })
    }

    /// Frame that stops streaming
    ///
    /// All configuration bytes are zero, the checksum is recomputed.
    pub fn stop() -> Self {
        let mut bytes = [0u8; Self::SIZE];
        bytes[Self::SIZE - 1] = checksum::calculate(&bytes[..Self::SIZE - 1]);
        Self { bytes }
    }

    /// Parse a received frame
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is shorter than 15 bytes or the
    /// checksum does not match. Trailing bytes are ignored.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::PacketTooShort {
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }

        let mut bytes = [0u8; Self::SIZE];
        bytes.copy_from_slice(&buf[..Self::SIZE]);

        let frame = Self { bytes };
        let calculated = checksum::calculate(&bytes[..Self::SIZE - 1]);
        if calculated != frame.checksum() {
            return Err(Error::ChecksumMismatch {
                expected: calculated,
                received: frame.checksum(),
            });
        }

        Ok(frame)
    }

    /// Configuration carried by this frame
    pub fn config(&self) -> DeviceConfig {
        let b = &self.bytes;
        let flags = ControlFlags::from_bits_truncate(b[0]);

        let mut slots = [ChannelSlot::inactive(); SLOT_COUNT];
        for (i, slot) in slots.iter_mut().enumerate() {
            *slot = decode_slot(b[Self::SLOT_OFFSET + i]);
            slot.active = match i {
                0..=7 => b[1] & (1 << i) != 0,
                8 => flags.contains(ControlFlags::SLOT_8),
                _ => flags.contains(ControlFlags::SLOT_9),
            };
        }

        DeviceConfig {
            slots,
            aux_rate: (b[0] & AUX_RATE_MASK) >> 4,
            analog_output: AnalogOutput {
                source: b[2] & 0x0F,
                channel: b[3],
                gain: (b[2] >> 4) & 0x03,
            },
        }
    }

    /// Whether the frame starts streaming
    pub fn is_streaming(&self) -> bool {
        ControlFlags::from_bits_truncate(self.bytes[0]).contains(ControlFlags::STREAM)
    }

    /// Trailing checksum byte
    pub fn checksum(&self) -> u8 {
        self.bytes[Self::SIZE - 1]
    }

    /// Raw frame bytes
    pub fn as_bytes(&self) -> &[u8; Self::SIZE] {
        &self.bytes
    }
}

fn encode_slot(slot: &ChannelSlot) -> u8 {
    (slot.mode << 6)
        | (slot.gain << 4)
        | ((slot.high_pass as u8) << 3)
        | ((slot.hi_res as u8) << 2)
        | slot.sample_rate
}

fn decode_slot(byte: u8) -> ChannelSlot {
    ChannelSlot {
        active: false,
        mode: byte >> 6,
        gain: (byte >> 4) & 0x03,
        high_pass: byte & 0b1000 != 0,
        hi_res: byte & 0b0100 != 0,
        sample_rate: byte & 0x03,
    }
}

impl AsRef<[u8]> for ConfigFrame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for ConfigFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigFrame")
            .field("bytes", &hex::encode(self.bytes))
            .field("streaming", &self.is_streaming())
            .field("checksum", &format!("0x{:02X}", self.checksum()))
            .finish()
    }
}
