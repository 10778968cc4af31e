//! Frame checksum algorithm
//!
//! Every command and configuration frame ends with a single CRC byte:
//! 1. Start with a zero register
//! 2. Feed each byte least-significant bit first
//! 3. When the feedback bit is set, XOR the shifted register with 0x8C
//! 4. No final XOR
//!
//! This is the reflected CRC-8 with polynomial 0x31, also known as
//! CRC-8/MAXIM-DOW or the Dallas one-wire CRC.

use tracing::trace;

/// Reflected form of the 0x31 polynomial
pub const POLYNOMIAL: u8 = 0x8C;

/// Calculate the frame checksum over `bytes`
///
/// # Algorithm
///
/// ```text
/// crc = 0
/// for byte in bytes:
///     repeat 8 times:
///         feedback = (crc ^ byte) & 1
///         crc >>= 1
///         if feedback: crc ^= 0x8C
///         byte >>= 1
/// ```
///
/// # Examples
///
/// ```
/// use novecento_core::checksum;
///
/// assert_eq!(checksum::calculate(&[0x01]), 0x5E);
/// assert_eq!(checksum::calculate(b"123456789"), 0xA1);
/// assert_eq!(checksum::calculate(&[]), 0);
/// ```
pub fn calculate(bytes: &[u8]) -> u8 {
    let mut crc: u8 = 0;

    for &byte in bytes {
        let mut extract = byte;

        for _ in 0..8 {
            let feedback = (crc ^ extract) & 1;
            crc >>= 1;

            if feedback != 0 {
                crc ^= POLYNOMIAL;
            }

            extract >>= 1;
        }
    }

    trace!(
        len = bytes.len(),
        checksum = format!("0x{:02X}", crc),
        "Calculated checksum"
    );

    crc
}

/// Verify a frame whose last byte is the checksum of the preceding bytes
///
/// An empty frame has no checksum byte and never verifies.
pub fn verify(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((&received, body)) => calculate(body) == received,
        None => false,
    }
}
