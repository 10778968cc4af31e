//! Protocol constants and device lookup tables

/// Default device address on the acquisition LAN (link-local)
pub const DEFAULT_HOST: &str = "169.254.1.10";

/// Default device TCP port
pub const DEFAULT_PORT: u16 = 23456;

/// Default connection timeout (seconds)
pub const DEFAULT_TIMEOUT: u64 = 5;

/// Default read timeout (seconds)
pub const DEFAULT_READ_TIMEOUT: u64 = 5;

/// Receive buffer requested at connect time, before the block size is known
pub const DEFAULT_RECEIVE_BUFFER: usize = 8 * 1024 * 1024;

/// Number of primary channel slots
pub const SLOT_COUNT: usize = 10;

/// Number of auxiliary channels
pub const AUX_CHANNELS: usize = 16;

/// Time samples carried by one frame
pub const SAMPLES_PER_FRAME: usize = 500;

/// Rows of the trailing status/reserved region of every frame
pub const STATUS_REGION_ROWS: usize = 128;

/// Bytes per streamed sample (little-endian i16)
pub const BYTES_PER_SAMPLE: usize = 2;

/// Size of every query response
pub const RESPONSE_SIZE: usize = 20;

/// Size of a configuration frame including the checksum byte
pub const CONFIG_FRAME_SIZE: usize = 15;

/// Volts per auxiliary count: 5 V full scale over 16 bits, front-end gain 0.5
pub const AUX_GAIN_FACTOR: f64 = 5.0 / 65536.0 / 0.5;

/// Channels carried by each probe type code
pub const CHANNELS_PER_TYPE: [usize; 16] = [0, 14, 22, 38, 46, 70, 102, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// Sample rates (Hz) addressed by the slot and aux rate selectors
pub const SAMPLE_RATES_HZ: [usize; 4] = [500, 2000, 4000, 8000];

/// Aux rate selector as encoded in byte 0 of the configuration frame
pub const AUX_RATE_CODES: [u8; 4] = [0, 16, 32, 48];

/// Rows occupied by the aux bank in one frame, per aux rate selector
pub const AUX_SLOT_SIZES: [usize; 4] = [16, 64, 128, 256];

/// Highest valid mode selector
pub const MAX_MODE: u8 = 3;

/// Highest valid gain selector
pub const MAX_GAIN: u8 = 3;

/// Highest valid rate selector
pub const MAX_RATE: u8 = 3;

/// Highest valid analog output source selector
pub const MAX_ANALOG_SOURCE: u8 = 15;

/// Look up the channel count for a probe type code
///
/// Codes outside the table carry no channels.
pub fn channels_for_type(type_code: u8) -> usize {
    CHANNELS_PER_TYPE
        .get(type_code as usize)
        .copied()
        .unwrap_or(0)
}

/// Device status byte values
pub mod status {
    /// No error
    pub const OK: u8 = 0;

    /// The device observed a checksum error in a frame we sent
    pub const CHECKSUM_ERROR: u8 = 255;
}
