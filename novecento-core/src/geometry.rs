//! Byte geometry of the streamed blocks
//!
//! One frame is a matrix of `frame_slot_total` rows (i16 samples) by 500
//! columns. The rows are laid out as:
//!
//! ```text
//! ┌──────────┬──────────┬─────┬──────────┬───────────┬────────────────┐
//! │  slot 0  │  slot 1  │ ... │  slot 9  │  aux bank │ status region  │
//! │ size[0]  │ size[1]  │     │ size[9]  │  16..256  │   128 rows     │
//! └──────────┴──────────┴─────┴──────────┴───────────┴────────────────┘
//! 0      offsets[1] offsets[2]        offsets[10]             frame_slot_total
//! ```
//!
//! A block groups `frames_per_block` frames and is what the decoder
//! carves out of the byte stream.

use std::ops::Range;

use tracing::debug;

use crate::{
    config::{DeviceConfig, SampleRate},
    constants::{
        AUX_SLOT_SIZES, BYTES_PER_SAMPLE, SAMPLES_PER_FRAME, SLOT_COUNT, STATUS_REGION_ROWS,
    },
    error::{Error, Result},
    response::SettingsResponse,
};

/// Derived layout of one streamed block
///
/// Immutable once built. Obtain it from [`PacketGeometry::derive`] after
/// the device reported its accepted configuration. The default value is an
/// unnegotiated geometry with no rows and a zero block size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketGeometry {
    slot_offsets: [usize; SLOT_COUNT + 1],
    slot_sizes: [usize; SLOT_COUNT],
    aux_rate: SampleRate,
    aux_slot_size: usize,
    frame_slot_total: usize,
    frames_per_block: usize,
    block_byte_size: usize,
}

impl PacketGeometry {
    /// Build a geometry from per-slot row counts
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFramesPerBlock`] if `frames_per_block` is 0.
    pub fn new(
        slot_sizes: [usize; SLOT_COUNT],
        aux_rate: SampleRate,
        frames_per_block: usize,
    ) -> Result<Self> {
        if frames_per_block == 0 {
            return Err(Error::InvalidFramesPerBlock);
        }

        let mut slot_offsets = [0usize; SLOT_COUNT + 1];
        for (i, size) in slot_sizes.iter().enumerate() {
            slot_offsets[i + 1] = slot_offsets[i] + size;
        }

        let aux_slot_size = AUX_SLOT_SIZES[aux_rate as usize];
        let frame_slot_total = slot_offsets[SLOT_COUNT] + aux_slot_size + STATUS_REGION_ROWS;
        let block_byte_size =
            frame_slot_total * SAMPLES_PER_FRAME * frames_per_block * BYTES_PER_SAMPLE;

        Ok(Self {
            slot_offsets,
            slot_sizes,
            aux_rate,
            aux_slot_size,
            frame_slot_total,
            frames_per_block,
            block_byte_size,
        })
    }

    /// Derive the geometry the device will stream with
    ///
    /// `accepted` is the settings response read back after the
    /// configuration frame was sent. A slot contributes rows only if it was
    /// requested active and its probe type carries channels; the device
    /// always wins over the request.
    pub fn derive(
        config: &DeviceConfig,
        accepted: &SettingsResponse,
        frames_per_block: usize,
    ) -> Result<Self> {
        config.validate()?;

        let mut slot_sizes = [0usize; SLOT_COUNT];
        for (i, slot) in config.slots.iter().enumerate() {
            let sample_count = accepted.sample_count(i);

            if !slot.active {
                continue;
            }

            if sample_count == 0 {
                debug!(slot = i, "Slot requested active but no probe reported, disabling");
                continue;
            }

            let rate_ratio = slot.rate()?.hz() / SAMPLES_PER_FRAME;
            slot_sizes[i] = (slot.hi_res as usize + 1) * rate_ratio * sample_count;
        }

        let geometry = Self::new(slot_sizes, config.aux_rate()?, frames_per_block)?;

        debug!(
            frame_slot_total = geometry.frame_slot_total,
            block_byte_size = geometry.block_byte_size,
            active_slots = geometry.active_slots(),
            "Derived packet geometry"
        );

        Ok(geometry)
    }

    /// Prefix sums of the slot sizes; `slot_offsets()[10]` is where the aux bank starts
    pub fn slot_offsets(&self) -> &[usize; SLOT_COUNT + 1] {
        &self.slot_offsets
    }

    pub fn slot_sizes(&self) -> &[usize; SLOT_COUNT] {
        &self.slot_sizes
    }

    /// Whether `slot` is part of the stream
    pub fn is_active(&self, slot: usize) -> bool {
        self.slot_sizes.get(slot).is_some_and(|&size| size > 0)
    }

    /// Number of slots present in the stream
    pub fn active_slots(&self) -> usize {
        self.slot_sizes.iter().filter(|&&size| size > 0).count()
    }

    pub fn aux_rate(&self) -> SampleRate {
        self.aux_rate
    }

    pub fn aux_slot_size(&self) -> usize {
        self.aux_slot_size
    }

    /// Rows in one frame
    pub fn frame_slot_total(&self) -> usize {
        self.frame_slot_total
    }

    pub fn frames_per_block(&self) -> usize {
        self.frames_per_block
    }

    /// Bytes in one block
    pub fn block_byte_size(&self) -> usize {
        self.block_byte_size
    }

    /// Columns of the decoded block matrix
    pub fn columns(&self) -> usize {
        SAMPLES_PER_FRAME * self.frames_per_block
    }

    /// i16 samples in one block
    pub fn samples_per_block(&self) -> usize {
        self.frame_slot_total * self.columns()
    }

    /// Samples each aux channel receives per block
    pub fn aux_samples_per_channel(&self) -> usize {
        self.aux_rate.hz() * self.frames_per_block
    }

    /// Rows of one slot
    ///
    /// # Panics
    ///
    /// Panics if `slot >= SLOT_COUNT`.
    pub fn slot_rows(&self, slot: usize) -> Range<usize> {
        self.slot_offsets[slot]..self.slot_offsets[slot + 1]
    }

    /// Rows of the aux bank
    pub fn aux_rows(&self) -> Range<usize> {
        self.slot_offsets[SLOT_COUNT]..self.status_start()
    }

    /// Rows of the trailing status region
    pub fn status_rows(&self) -> Range<usize> {
        self.status_start()..self.frame_slot_total
    }

    fn status_start(&self) -> usize {
        self.frame_slot_total.saturating_sub(STATUS_REGION_ROWS)
    }
}

impl Default for PacketGeometry {
    fn default() -> Self {
        Self {
            slot_offsets: [0; SLOT_COUNT + 1],
            slot_sizes: [0; SLOT_COUNT],
            aux_rate: SampleRate::default(),
            aux_slot_size: 0,
            frame_slot_total: 0,
            frames_per_block: 0,
            block_byte_size: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelSlot;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn codes(pairs: &[(usize, u8)]) -> SettingsResponse {
        let mut codes = [0u8; SLOT_COUNT];
        for &(slot, code) in pairs {
            codes[slot] = code;
        }
        SettingsResponse::new(codes, 0)
    }

    #[test]
    fn test_derive_three_probes() {
        // Three 14-channel probes at 2 kHz
        let config = DeviceConfig::from_slots(&[ChannelSlot::enabled(); 3]).unwrap();
        let geometry = PacketGeometry::derive(&config, &codes(&[(0, 1), (1, 1), (2, 1)]), 1).unwrap();

        assert_eq!(&geometry.slot_sizes()[..3], &[56, 56, 56]);
        assert_eq!(geometry.slot_offsets()[10], 168);
        assert_eq!(geometry.aux_slot_size(), 16);
        assert_eq!(geometry.frame_slot_total(), 168 + 16 + 128);
        assert_eq!(geometry.block_byte_size(), 312 * 500 * 2);
        assert_eq!(geometry.active_slots(), 3);
    }

    #[test]
    fn test_device_overrides_request() {
        // Slot 1 requested active but the device reports type code 0
        let config = DeviceConfig::from_slots(&[ChannelSlot::enabled(); 2]).unwrap();
        let geometry = PacketGeometry::derive(&config, &codes(&[(0, 2)]), 1).unwrap();

        assert_eq!(geometry.slot_sizes()[1], 0);
        assert!(!geometry.is_active(1));
        assert_eq!(geometry.slot_offsets()[1], geometry.slot_offsets()[2]);
    }

    #[test]
    fn test_inactive_slot_ignores_probe() {
        let config = DeviceConfig::new().with_slot(0, ChannelSlot::enabled());
        let geometry = PacketGeometry::derive(&config, &codes(&[(0, 1), (4, 3)]), 1).unwrap();

        assert_eq!(geometry.slot_sizes()[4], 0);
        assert_eq!(geometry.active_slots(), 1);
    }

    #[test]
    fn test_hi_res_and_rate() {
        let slot = ChannelSlot::enabled()
            .with_hi_res(true)
            .with_sample_rate(SampleRate::Hz8000);
        let config = DeviceConfig::new().with_slot(3, slot);
        let geometry = PacketGeometry::derive(&config, &codes(&[(3, 4)]), 1).unwrap();

        assert_eq!(geometry.slot_sizes()[3], 2 * 16 * 46);
        assert_eq!(geometry.slot_rows(3), 0..2 * 16 * 46);
    }

    #[test]
    fn test_unknown_type_code_disables_slot() {
        let config = DeviceConfig::new().with_slot(0, ChannelSlot::enabled());
        let geometry = PacketGeometry::derive(&config, &codes(&[(0, 99)]), 1).unwrap();

        assert_eq!(geometry.active_slots(), 0);
        assert_eq!(geometry.frame_slot_total(), 16 + 128);
    }

    #[test]
    fn test_aux_rows_and_frames_per_block() {
        let geometry =
            PacketGeometry::new([20, 0, 0, 0, 0, 0, 0, 0, 0, 0], SampleRate::Hz2000, 2).unwrap();

        assert_eq!(geometry.aux_rows(), 20..84);
        assert_eq!(geometry.status_rows(), 84..212);
        assert_eq!(geometry.columns(), 1000);
        assert_eq!(geometry.aux_samples_per_channel(), 4000);
        assert_eq!(geometry.block_byte_size(), 212 * 500 * 2 * 2);
    }

    #[test]
    fn test_default_is_unnegotiated() {
        let geometry = PacketGeometry::default();
        assert_eq!(geometry.block_byte_size(), 0);
        assert!(geometry.aux_rows().is_empty());
        assert!(geometry.status_rows().is_empty());
    }

    #[test]
    fn test_zero_frames_per_block() {
        assert!(matches!(
            PacketGeometry::new([0; SLOT_COUNT], SampleRate::Hz500, 0),
            Err(Error::InvalidFramesPerBlock)
        ));
    }

    proptest! {
        #[test]
        fn prop_geometry_invariants(
            requested in proptest::array::uniform10(any::<bool>()),
            hi_res in proptest::array::uniform10(any::<bool>()),
            rates in proptest::array::uniform10(0u8..=3),
            type_codes in proptest::array::uniform10(0u8..=20),
            aux_rate in 0u8..=3,
            frames_per_block in 1usize..=4,
        ) {
            let mut config = DeviceConfig::new();
            for i in 0..SLOT_COUNT {
                config.slots[i].active = requested[i];
                config.slots[i].hi_res = hi_res[i];
                config.slots[i].sample_rate = rates[i];
            }
            config.aux_rate = aux_rate;

            let settings = SettingsResponse::new(type_codes, 0);
            let geometry = PacketGeometry::derive(&config, &settings, frames_per_block).unwrap();
            let offsets = geometry.slot_offsets();

            prop_assert_eq!(offsets[0], 0);
            for i in 0..SLOT_COUNT {
                prop_assert!(offsets[i] <= offsets[i + 1]);
                if !requested[i] || settings.sample_count(i) == 0 {
                    prop_assert_eq!(geometry.slot_sizes()[i], 0);
                }
            }

            prop_assert_eq!(
                offsets[SLOT_COUNT] + geometry.aux_slot_size() + STATUS_REGION_ROWS,
                geometry.frame_slot_total()
            );
            prop_assert_eq!(
                geometry.block_byte_size(),
                geometry.frame_slot_total() * 500 * frames_per_block * 2
            );
            prop_assert_eq!(geometry.block_byte_size() % 2, 0);
            prop_assert_eq!(geometry.block_byte_size() % (geometry.frame_slot_total() * 2), 0);
        }
    }
}
