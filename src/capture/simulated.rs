//! Simulated camera for tests and demos.
//!
//! Each device identifier is described by a [`SimulatedProfile`]: frame size,
//! brightness, how many reads fail after each open, which backends and
//! resolutions it accepts. Counters on the opener let tests check that
//! every handle opened was also closed.

use super::device::{Backend, CameraDevice, CameraError, DeviceInfo, DeviceOpener, OpenRequest};
use super::Frame;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Behaviour of one simulated device.
#[derive(Debug, Clone)]
pub struct SimulatedProfile {
    /// Frame size used when no format is requested.
    pub width: u32,
    pub height: u32,
    /// Luminance every pixel is filled with.
    pub luminance: u8,
    /// Colour (3) or grayscale (1) frames.
    pub channels: u8,
    /// Reads that fail right after each open.
    pub fail_first_reads: u64,
    /// Reads after this many (per handle) fail.
    pub fail_after: Option<u64>,
    /// Whether the native backend can open this device.
    pub native_supported: bool,
    /// Resolutions the device accepts; `None` accepts any.
    pub resolutions: Option<Vec<(u32, u32)>>,
    /// Refuse to open with a permission error.
    pub deny_access: bool,
}

impl Default for SimulatedProfile {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            luminance: 128,
            channels: 3,
            fail_first_reads: 0,
            fail_after: None,
            native_supported: true,
            resolutions: None,
            deny_access: false,
        }
    }
}

impl SimulatedProfile {
    /// A device producing frames of the given size and brightness.
    pub fn with_frames(width: u32, height: u32, luminance: u8) -> Self {
        Self {
            width,
            height,
            luminance,
            ..Default::default()
        }
    }
}

/// Shared counters across all handles of one opener.
#[derive(Debug, Default)]
pub struct SimulatorCounters {
    opens: AtomicU64,
    reads: AtomicU64,
    live: AtomicI64,
    fail_reads: AtomicBool,
}

impl SimulatorCounters {
    /// Successful opens so far.
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }

    /// Read calls so far, failed or not.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Handles currently open.
    pub fn live_handles(&self) -> i64 {
        self.live.load(Ordering::SeqCst)
    }

    /// Makes every subsequent read on every handle fail (or recover).
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

/// Opener backed by in-memory device profiles.
#[derive(Debug, Default)]
pub struct SimulatedOpener {
    profiles: Mutex<HashMap<u32, SimulatedProfile>>,
    counters: Arc<SimulatorCounters>,
}

impl SimulatedOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opener with a single healthy device 0.
    pub fn single() -> Self {
        Self::new().with_device(0, SimulatedProfile::default())
    }

    pub fn with_device(self, device_id: u32, profile: SimulatedProfile) -> Self {
        self.set_profile(device_id, profile);
        self
    }

    /// Replaces (or adds) a device profile. Affects handles opened afterwards.
    pub fn set_profile(&self, device_id: u32, profile: SimulatedProfile) {
        self.profiles.lock().insert(device_id, profile);
    }

    pub fn counters(&self) -> Arc<SimulatorCounters> {
        Arc::clone(&self.counters)
    }
}

impl DeviceOpener for SimulatedOpener {
    fn open(&self, request: &OpenRequest) -> Result<Box<dyn CameraDevice>, CameraError> {
        let profile = self
            .profiles
            .lock()
            .get(&request.device_id)
            .cloned()
            .ok_or_else(|| CameraError::DeviceNotFound(format!("device {}", request.device_id)))?;

        if profile.deny_access {
            return Err(CameraError::PermissionDenied(format!(
                "device {}",
                request.device_id
            )));
        }
        if request.backend == Backend::Native && !profile.native_supported {
            return Err(CameraError::OpenFailed(format!(
                "native backend cannot open device {}",
                request.device_id
            )));
        }

        let (width, height, fps, buffer_depth) = match request.format {
            Some(format) => {
                if let Some(ref accepted) = profile.resolutions {
                    if !accepted.contains(&(format.width, format.height)) {
                        return Err(CameraError::ConfigFailed(format!(
                            "{}x{} not supported",
                            format.width, format.height
                        )));
                    }
                }
                (format.width, format.height, format.fps, format.buffer_depth)
            }
            None => (profile.width, profile.height, 30, 4),
        };

        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(device = request.device_id, backend = %request.backend, "Simulated device opened");

        Ok(Box::new(SimulatedDevice {
            info: DeviceInfo {
                device_id: request.device_id,
                backend: request.backend,
                width,
                height,
                fps,
                buffer_depth,
                strategy: None,
            },
            profile,
            counters: Arc::clone(&self.counters),
            reads: 0,
            open: true,
        }))
    }
}

/// One open simulated handle.
#[derive(Debug)]
pub struct SimulatedDevice {
    info: DeviceInfo,
    profile: SimulatedProfile,
    counters: Arc<SimulatorCounters>,
    reads: u64,
    open: bool,
}

impl CameraDevice for SimulatedDevice {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        if !self.open {
            return Err(CameraError::NotInitialized);
        }
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        self.reads += 1;

        if self.counters.fail_reads.load(Ordering::SeqCst)
            || self.reads <= self.profile.fail_first_reads
            || self.profile.fail_after.is_some_and(|limit| self.reads > limit)
        {
            return Err(CameraError::CaptureFailed(format!(
                "simulated read failure #{}",
                self.reads
            )));
        }

        let pixel_count = (self.info.width * self.info.height) as usize;
        let channels = self.profile.channels.max(1);
        let pixels = vec![self.profile.luminance; pixel_count * channels as usize];
        Ok(if channels >= 3 {
            Frame::rgb(pixels, self.info.width, self.info.height, self.reads)
        } else {
            Frame::gray(pixels, self.info.width, self.info.height, self.reads)
        })
    }

    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.counters.live.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(device = self.info.device_id, "Simulated device closed");
        }
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.close();
    }
}
