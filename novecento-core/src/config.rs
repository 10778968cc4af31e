//! Channel configuration requested from the device
//!
//! Selectors are kept as the raw table indices the device understands and
//! are validated before a frame is built. Nothing here is clamped.

use std::fmt;

use crate::{
    constants::{
        AUX_SLOT_SIZES, MAX_ANALOG_SOURCE, MAX_GAIN, MAX_MODE, MAX_RATE, SAMPLE_RATES_HZ,
        SLOT_COUNT,
    },
    error::{Error, Result},
};

/// Sample rate selector shared by channel slots and the aux bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SampleRate {
    #[default]
    Hz500 = 0,
    Hz2000 = 1,
    Hz4000 = 2,
    Hz8000 = 3,
}

impl SampleRate {
    /// Rate in Hz
    pub fn hz(self) -> usize {
        SAMPLE_RATES_HZ[self as usize]
    }

    /// Selector index as sent to the device
    pub fn selector(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for SampleRate {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Hz500),
            1 => Ok(Self::Hz2000),
            2 => Ok(Self::Hz4000),
            3 => Ok(Self::Hz8000),
            _ => Err(Error::InvalidSelector {
                field: "sample rate",
                slot: None,
                value,
                max: MAX_RATE,
            }),
        }
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.hz())
    }
}

/// One of the ten primary channel slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSlot {
    /// Requested active; the device may still disable it
    pub active: bool,

    /// Acquisition mode selector (0..=3)
    pub mode: u8,

    /// Gain selector (0..=3)
    pub gain: u8,

    /// High-pass filter enable
    pub high_pass: bool,

    /// High resolution (doubles the samples per frame)
    pub hi_res: bool,

    /// Rate selector (0..=3)
    pub sample_rate: u8,
}

impl ChannelSlot {
    /// Inactive slot with the high-pass filter enabled
    pub const fn inactive() -> Self {
        Self {
            active: false,
            mode: 0,
            gain: 0,
            high_pass: true,
            hi_res: false,
            sample_rate: SampleRate::Hz2000 as u8,
        }
    }

    /// Active slot with default settings
    pub const fn enabled() -> Self {
        Self {
            active: true,
            ..Self::inactive()
        }
    }

    pub fn with_mode(mut self, mode: u8) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_gain(mut self, gain: u8) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_high_pass(mut self, enabled: bool) -> Self {
        self.high_pass = enabled;
        self
    }

    pub fn with_hi_res(mut self, enabled: bool) -> Self {
        self.hi_res = enabled;
        self
    }

    pub fn with_sample_rate(mut self, rate: SampleRate) -> Self {
        self.sample_rate = rate.selector();
        self
    }

    /// Validated rate of this slot
    pub fn rate(&self) -> Result<SampleRate> {
        SampleRate::try_from(self.sample_rate)
    }

    fn validate(&self, index: usize) -> Result<()> {
        check("mode", Some(index), self.mode, MAX_MODE)?;
        check("gain", Some(index), self.gain, MAX_GAIN)?;
        check("sample rate", Some(index), self.sample_rate, MAX_RATE)?;
        Ok(())
    }
}

impl Default for ChannelSlot {
    fn default() -> Self {
        Self::inactive()
    }
}

/// Analog output routing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalogOutput {
    /// Input source selector (0..=15)
    pub source: u8,

    /// Channel routed to the output
    pub channel: u8,

    /// Output gain selector (0..=3)
    pub gain: u8,
}

impl Default for AnalogOutput {
    fn default() -> Self {
        Self {
            source: 2,
            channel: 1,
            gain: 2,
        }
    }
}

/// Complete configuration pushed to the device
///
/// # Examples
///
/// ```
/// use novecento_core::{ChannelSlot, DeviceConfig, SampleRate};
///
/// let config = DeviceConfig::new()
///     .with_slot(0, ChannelSlot::enabled())
///     .with_slot(1, ChannelSlot::enabled().with_sample_rate(SampleRate::Hz4000))
///     .with_aux_rate(SampleRate::Hz500);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Primary channel slots
    pub slots: [ChannelSlot; SLOT_COUNT],

    /// Aux bank rate selector (0..=3)
    pub aux_rate: u8,

    /// Analog output routing
    pub analog_output: AnalogOutput,
}

impl DeviceConfig {
    /// All slots inactive, aux bank at 500 Hz
    pub fn new() -> Self {
        let mut slots = [ChannelSlot::inactive(); SLOT_COUNT];
        // The last two slots default to the base rate
        slots[8].sample_rate = SampleRate::Hz500 as u8;
        slots[9].sample_rate = SampleRate::Hz500 as u8;

        Self {
            slots,
            aux_rate: SampleRate::Hz500 as u8,
            analog_output: AnalogOutput::default(),
        }
    }

    /// Build from a list of slots
    ///
    /// Missing slots are filled with inactive ones. More than
    /// [`SLOT_COUNT`] slots is an error.
    pub fn from_slots(slots: &[ChannelSlot]) -> Result<Self> {
        if slots.len() > SLOT_COUNT {
            return Err(Error::TooManySlots {
                count: slots.len(),
                max: SLOT_COUNT,
            });
        }

        let mut config = Self::new();
        config.slots[..slots.len()].copy_from_slice(slots);
        Ok(config)
    }

    /// Replace one slot
    ///
    /// # Panics
    ///
    /// Panics if `index >= SLOT_COUNT`.
    pub fn with_slot(mut self, index: usize, slot: ChannelSlot) -> Self {
        self.slots[index] = slot;
        self
    }

    pub fn with_aux_rate(mut self, rate: SampleRate) -> Self {
        self.aux_rate = rate.selector();
        self
    }

    pub fn with_analog_output(mut self, output: AnalogOutput) -> Self {
        self.analog_output = output;
        self
    }

    /// Validated aux bank rate
    pub fn aux_rate(&self) -> Result<SampleRate> {
        SampleRate::try_from(self.aux_rate).map_err(|_| Error::InvalidSelector {
            field: "aux rate",
            slot: None,
            value: self.aux_rate,
            max: MAX_RATE,
        })
    }

    /// Rows the aux bank occupies in one frame
    pub fn aux_slot_size(&self) -> Result<usize> {
        Ok(AUX_SLOT_SIZES[self.aux_rate()? as usize])
    }

    /// Check every selector against its lookup table
    pub fn validate(&self) -> Result<()> {
        for (index, slot) in self.slots.iter().enumerate() {
            slot.validate(index)?;
        }

        self.aux_rate()?;
        check("analog source", None, self.analog_output.source, MAX_ANALOG_SOURCE)?;
        check("analog gain", None, self.analog_output.gain, MAX_GAIN)?;

        Ok(())
    }

    /// Number of slots requested active
    pub fn requested_active(&self) -> usize {
        self.slots.iter().filter(|s| s.active).count()
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn check(field: &'static str, slot: Option<usize>, value: u8, max: u8) -> Result<()> {
    if value > max {
        return Err(Error::InvalidSelector {
            field,
            slot,
            value,
            max,
        });
    }
    Ok(())
}
