//! # novecento-core
//!
//! Core protocol implementation for Novecento-class acquisition units.
//!
//! This crate provides the low-level protocol primitives:
//! - Frame checksum calculation
//! - Command and configuration frame encoding
//! - Query response parsing
//! - Packet geometry derivation
//! - Stream block decoding

pub mod checksum;
pub mod command;
pub mod config;
pub mod constants;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod response;
pub mod session;

pub use command::Command;
pub use config::{AnalogOutput, ChannelSlot, DeviceConfig, SampleRate};
pub use decoder::{decode_block, AuxSampleMatrix, DecoderStats, SampleSink, StreamDecoder};
pub use error::{Error, Result};
pub use frame::ConfigFrame;
pub use geometry::PacketGeometry;
pub use response::{BatteryResponse, DeviceStatus, FirmwareResponse, Response, SettingsResponse};
pub use session::{Session, SessionState};

/// Default frames per block (one second of data)
pub const DEFAULT_FRAMES_PER_BLOCK: usize = 1;
