//! Camera device abstraction.
//!
//! A [`DeviceOpener`] turns an [`OpenRequest`] into a live [`CameraDevice`]
//! handle. Keeping the two apart lets the scanner and the resource manager
//! try many open strategies against real hardware or a simulated device.

use super::Frame;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    #[error("failed to configure camera: {0}")]
    ConfigFailed(String),
    #[error("failed to read frame: {0}")]
    CaptureFailed(String),
    #[error("camera access denied: {0}")]
    PermissionDenied(String),
    #[error("camera not initialized")]
    NotInitialized,
}

/// Platform access path used to open a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// The platform's native capture API (V4L2, Media Foundation, AVFoundation).
    Native,
    /// Let the platform choose.
    Auto,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Native => f.write_str("native"),
            Backend::Auto => f.write_str("auto"),
        }
    }
}

/// Properties pushed to a device after it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatRequest {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Driver-side frame buffer depth.
    pub buffer_depth: u32,
}

/// Everything needed to open one device handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenRequest {
    pub device_id: u32,
    pub backend: Backend,
    /// `None` leaves the device at whatever format it opens with.
    pub format: Option<FormatRequest>,
}

impl OpenRequest {
    pub fn new(device_id: u32, backend: Backend) -> Self {
        Self {
            device_id,
            backend,
            format: None,
        }
    }

    pub fn with_format(mut self, format: FormatRequest) -> Self {
        self.format = Some(format);
        self
    }
}

/// Description of an open handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: u32,
    pub backend: Backend,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Driver frame queue depth in effect; 0 when the backend gives no
    /// control over it.
    pub buffer_depth: u32,
    /// Name of the strategy that produced the handle, once owned by the manager.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

/// An open camera handle.
pub trait CameraDevice: Send {
    /// Reads a single frame.
    fn read_frame(&mut self) -> Result<Frame, CameraError>;

    /// Describes the handle's effective configuration.
    fn info(&self) -> DeviceInfo;

    /// Releases the hardware. Calling it twice is harmless.
    fn close(&mut self);
}

/// Opens device handles.
pub trait DeviceOpener: Send + Sync {
    /// Opens a device. The returned handle is already configured.
    fn open(&self, request: &OpenRequest) -> Result<Box<dyn CameraDevice>, CameraError>;
}

/// Reads up to `attempts` frames and returns how many came back valid.
///
/// Stops early once `required` successes have been seen; sleeps `backoff`
/// after each failed read.
pub(crate) fn count_valid_reads(
    device: &mut dyn CameraDevice,
    attempts: u32,
    required: u32,
    backoff: std::time::Duration,
) -> (u32, Option<CameraError>) {
    let mut ok = 0;
    let mut last_error = None;
    for attempt in 1..=attempts {
        match device.read_frame() {
            Ok(frame) if frame.is_valid() && !frame.is_empty() => {
                ok += 1;
                if ok >= required {
                    break;
                }
            }
            Ok(_) => {
                tracing::trace!(attempt, "Read returned an unusable frame");
                last_error = Some(CameraError::CaptureFailed("unusable frame".into()));
                if !backoff.is_zero() {
                    std::thread::sleep(backoff);
                }
            }
            Err(e) => {
                tracing::trace!(attempt, error = %e, "Frame read failed");
                last_error = Some(e);
                if !backoff.is_zero() {
                    std::thread::sleep(backoff);
                }
            }
        }
    }
    (ok, last_error)
}

/// Closes a handle when dropped unless explicitly taken.
pub(crate) struct HandleGuard(Option<Box<dyn CameraDevice>>);

impl HandleGuard {
    pub(crate) fn new(device: Box<dyn CameraDevice>) -> Self {
        Self(Some(device))
    }

    pub(crate) fn device(&mut self) -> &mut dyn CameraDevice {
        match self.0 {
            Some(ref mut device) => device.as_mut(),
            None => unreachable!("handle already taken"),
        }
    }

    pub(crate) fn take(mut self) -> Box<dyn CameraDevice> {
        match self.0.take() {
            Some(device) => device,
            None => unreachable!("handle already taken"),
        }
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        if let Some(mut device) = self.0.take() {
            device.close();
        }
    }
}
