//! Camera devices and frame handling.
//!
//! This module provides the hardware boundary: a [`DeviceOpener`] produces
//! [`CameraDevice`] handles that read [`Frame`]s. Everything above it
//! (scanning, lifecycle, capture, streaming) only sees these traits.

mod config;
mod device;
mod encode;
mod frame;
#[cfg(feature = "camera")]
mod native;
mod simulated;

pub(crate) use device::{count_valid_reads, HandleGuard};
pub use config::{
    CaptureConfig, ConfigError, DeviceConfig, FileConfig, OutputConfig, StreamConfig,
    TimingConfig,
};
pub use device::{
    Backend, CameraDevice, CameraError, DeviceInfo, DeviceOpener, FormatRequest, OpenRequest,
};
pub use encode::EncodeError;
pub use frame::Frame;
#[cfg(feature = "camera")]
pub use native::{NokhwaDevice, NokhwaOpener};
pub use simulated::{SimulatedDevice, SimulatedOpener, SimulatedProfile, SimulatorCounters};
