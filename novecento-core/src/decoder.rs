//! Block decoder for the sample stream
//!
//! The device streams fixed-size blocks back to back with no header or
//! synchronization marker. TCP reads end wherever they like, so the
//! decoder accumulates bytes and cuts them into blocks of exactly
//! [`PacketGeometry::block_byte_size`] bytes.
//!
//! Alignment relies on the stream never losing or duplicating a byte. If it
//! does, every later block is shifted and there is no way to recover from
//! inside the stream. [`DecoderStats`] exposes the counters callers can watch
//! to notice.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use bytes::BytesMut;
use tracing::{trace, warn};

use crate::{
    constants::{AUX_CHANNELS, AUX_GAIN_FACTOR, BYTES_PER_SAMPLE},
    error::{Error, Result},
    geometry::PacketGeometry,
};

/// Aux channel samples of one block in volts
///
/// A `16 × samples_per_channel` matrix stored column-major: the 16 channel
/// values of sample 0 come first, then those of sample 1, and so on.
#[derive(Clone, PartialEq)]
pub struct AuxSampleMatrix {
    sequence: u64,
    channels: usize,
    samples_per_channel: usize,
    data: Vec<f64>,
}

impl AuxSampleMatrix {
    /// Wrap column-major data
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != channels * samples_per_channel`.
    pub fn from_column_major(
        sequence: u64,
        channels: usize,
        samples_per_channel: usize,
        data: Vec<f64>,
    ) -> Self {
        assert_eq!(
            data.len(),
            channels * samples_per_channel,
            "matrix data does not match its shape"
        );

        Self {
            sequence,
            channels,
            samples_per_channel,
            data,
        }
    }

    /// Position of the block in the stream, starting at 0
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Number of rows
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of columns
    pub fn samples_per_channel(&self) -> usize {
        self.samples_per_channel
    }

    /// Value of `channel` at `sample`
    pub fn get(&self, channel: usize, sample: usize) -> Option<f64> {
        if channel >= self.channels || sample >= self.samples_per_channel {
            return None;
        }
        Some(self.data[sample * self.channels + channel])
    }

    /// All samples of one channel in time order
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = f64> + '_ {
        self.data
            .iter()
            .skip(channel)
            .step_by(self.channels.max(1))
            .take(if channel < self.channels { self.samples_per_channel } else { 0 })
            .copied()
    }

    /// Values of every channel at one sample instant
    pub fn frame(&self, sample: usize) -> Option<&[f64]> {
        let start = sample.checked_mul(self.channels)?;
        self.data.get(start..start + self.channels)
    }

    /// Column-major backing slice
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }
}

impl fmt::Debug for AuxSampleMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuxSampleMatrix")
            .field("sequence", &self.sequence)
            .field("channels", &self.channels)
            .field("samples_per_channel", &self.samples_per_channel)
            .finish()
    }
}

/// Consumer of decoded matrices
///
/// Called from the receive task for every block, in stream order. An
/// implementation must return quickly; queue the matrix rather than
/// processing it inline.
pub trait SampleSink: Send {
    /// Take one decoded matrix
    ///
    /// Return [`Error::SinkClosed`] once no more matrices can be accepted.
    fn push(&mut self, matrix: AuxSampleMatrix) -> Result<()>;
}

impl SampleSink for Vec<AuxSampleMatrix> {
    fn push(&mut self, matrix: AuxSampleMatrix) -> Result<()> {
        Vec::push(self, matrix);
        Ok(())
    }
}

impl<F> SampleSink for F
where
    F: FnMut(AuxSampleMatrix) + Send,
{
    fn push(&mut self, matrix: AuxSampleMatrix) -> Result<()> {
        self(matrix);
        Ok(())
    }
}

/// Decoder counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Blocks decoded and delivered
    pub blocks_decoded: u64,

    /// Blocks dropped because they did not decode to the expected shape
    pub blocks_malformed: u64,

    /// Bytes removed from the accumulation buffer
    pub bytes_consumed: u64,
}

/// Decode one block into its aux matrix
///
/// The block is read as little-endian i16 samples forming a
/// `frame_slot_total × columns` column-major matrix. The aux rows are
/// flattened column-major and reshaped column-major into
/// `16 × aux_samples_per_channel`, then scaled to volts.
///
/// # Errors
///
/// Returns [`Error::MalformedBlock`] if the block does not hold exactly
/// `samples_per_block` samples.
pub fn decode_block(
    geometry: &PacketGeometry,
    block: &[u8],
    sequence: u64,
) -> Result<AuxSampleMatrix> {
    let expected = geometry.samples_per_block();
    if block.len() % BYTES_PER_SAMPLE != 0 || block.len() / BYTES_PER_SAMPLE != expected {
        return Err(Error::MalformedBlock {
            expected,
            actual: block.len() / BYTES_PER_SAMPLE,
        });
    }

    let mut samples = vec![0i16; expected];
    LittleEndian::read_i16_into(block, &mut samples);

    let rows = geometry.frame_slot_total();
    let aux = geometry.aux_rows();
    let aux_rows = aux.len();
    let columns = geometry.aux_samples_per_channel();

    let mut data = Vec::with_capacity(AUX_CHANNELS * columns);
    for flat in 0..AUX_CHANNELS * columns {
        // Position in the flattened aux region -> (row, column) of the block
        let column = flat / aux_rows;
        let row = aux.start + flat % aux_rows;
        let raw = i32::from(samples[column * rows + row]);
        data.push(f64::from(raw) * AUX_GAIN_FACTOR);
    }

    Ok(AuxSampleMatrix::from_column_major(
        sequence,
        AUX_CHANNELS,
        columns,
        data,
    ))
}

/// Reassembles blocks from arbitrary chunks and pushes decoded matrices
/// into a [`SampleSink`]
///
/// # Examples
///
/// ```
/// use novecento_core::{AuxSampleMatrix, PacketGeometry, SampleRate, StreamDecoder};
///
/// let geometry = PacketGeometry::new([0; 10], SampleRate::Hz500, 1).unwrap();
/// let mut decoder = StreamDecoder::new(geometry.clone(), Vec::<AuxSampleMatrix>::new()).unwrap();
///
/// let block = vec![0u8; geometry.block_byte_size()];
/// decoder.feed(&block[..1000]).unwrap();
/// assert_eq!(decoder.feed(&block[1000..]).unwrap(), 1);
/// assert_eq!(decoder.sink().len(), 1);
/// ```
pub struct StreamDecoder<S> {
    geometry: PacketGeometry,
    buffer: BytesMut,
    sink: S,
    next_sequence: u64,
    stats: DecoderStats,
}

impl<S: SampleSink> StreamDecoder<S> {
    /// Create a decoder for a negotiated geometry
    ///
    /// # Errors
    ///
    /// Returns [`Error::GeometryNotNegotiated`] if the geometry has no block size.
    pub fn new(geometry: PacketGeometry, sink: S) -> Result<Self> {
        if geometry.block_byte_size() == 0 {
            return Err(Error::GeometryNotNegotiated);
        }

        Ok(Self {
            buffer: BytesMut::with_capacity(geometry.block_byte_size() * 2),
            geometry,
            sink,
            next_sequence: 0,
            stats: DecoderStats::default(),
        })
    }

    /// Append a chunk and decode every complete block
    ///
    /// Returns the number of matrices delivered to the sink. Incomplete
    /// trailing bytes stay buffered for the next call.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::SinkClosed`] from the sink. Malformed blocks are
    /// logged and counted, not returned.
    pub fn feed(&mut self, raw: &[u8]) -> Result<usize> {
        self.buffer.extend_from_slice(raw);

        let block_size = self.geometry.block_byte_size();
        let mut emitted = 0;

        while self.buffer.len() >= block_size {
            let block = self.buffer.split_to(block_size);
            self.stats.bytes_consumed += block_size as u64;
            let sequence = self.next_sequence;
            self.next_sequence += 1;

            match decode_block(&self.geometry, &block, sequence) {
                Ok(matrix) => {
                    trace!(sequence, "Decoded block");
                    self.sink.push(matrix)?;
                    self.stats.blocks_decoded += 1;
                    emitted += 1;
                }
                Err(e) => {
                    self.stats.blocks_malformed += 1;
                    warn!(sequence, error = %e, "Dropping malformed block");
                }
            }
        }

        Ok(emitted)
    }

    /// Bytes waiting for the rest of their block
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    pub fn geometry(&self) -> &PacketGeometry {
        &self.geometry
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
