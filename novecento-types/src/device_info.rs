//! Device information structures

use std::fmt;

use chrono::{DateTime, Utc};

/// Number of probe connectors reported by the device
pub const PROBE_SLOTS: usize = 10;

/// Device information
///
/// Collected from the firmware, battery and settings queries during
/// negotiation. The firmware identifier is kept as the raw bytes the device
/// sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Raw firmware identifier (response bytes 1..20)
    pub firmware: Vec<u8>,
    
    /// Battery byte as reported, nominally a percentage
    pub battery_percent: u8,
    
    /// Probe type code per slot from the baseline settings query
    pub probe_type_codes: [u8; PROBE_SLOTS],
    
    /// When the queries completed
    pub queried_at: DateTime<Utc>,
}

impl DeviceInfo {
    /// Battery values are stored as the device sent them, even above 100
    pub fn new(firmware: impl Into<Vec<u8>>, battery_percent: u8) -> Self {
        Self {
            firmware: firmware.into(),
            battery_percent,
            probe_type_codes: [0; PROBE_SLOTS],
            queried_at: Utc::now(),
        }
    }

    /// Attach the probe type codes
    pub fn with_probe_type_codes(mut self, codes: [u8; PROBE_SLOTS]) -> Self {
        self.probe_type_codes = codes;
        self
    }

    /// Firmware identifier as text, trailing NULs removed
    pub fn firmware_version(&self) -> String {
        let end = self
            .firmware
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |i| i + 1);
        String::from_utf8_lossy(&self.firmware[..end]).into_owned()
    }

    /// Slots with a probe plugged in
    pub fn connected_probes(&self) -> usize {
        self.probe_type_codes.iter().filter(|&&code| code != 0).count()
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device[FW: {}, Battery: {}%, Probes: {}]",
            self.firmware_version(),
            self.battery_percent,
            self.connected_probes()
        )
    }
}
