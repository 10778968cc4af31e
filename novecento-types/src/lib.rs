//! Type definitions for novecento

pub mod device_info;

pub use device_info::DeviceInfo;
