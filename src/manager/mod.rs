//! Exclusive ownership of the camera handle.
//!
//! [`ResourceManager`] is the only owner of the hardware handle. `start` and
//! `stop` run under one lifecycle lock, so at most one open or close is in
//! flight at a time. Frame reads do not take that lock: they check the
//! state, then briefly lock the handle slot for the single read. A `stop`
//! racing a read waits for that read to finish; the next read fails.

mod state;
mod strategy;

pub use state::{PermissionStatus, ResourceState, ResourceStatus};
pub use strategy::{OpenStrategy, StrategyContext};

use crate::capture::{
    Backend, CameraDevice, CameraError, DeviceConfig, DeviceInfo, DeviceOpener, Frame,
    OpenRequest, TimingConfig,
};
use crate::error::{CaptureError, Result};
use crate::events::{CameraEvent, EventSink, TracingSink};
use crate::scanner::{AccessTier, DeviceDetail, DeviceScanner, ScanReport};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Devices as seen by [`ResourceManager::survey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSurvey {
    /// Qualifying devices and the tier that found them.
    pub scan: ScanReport,
    /// One entry per device in `scan`.
    pub details: Vec<DeviceDetail>,
}

/// Owns the single camera handle and its lifecycle.
pub struct ResourceManager {
    opener: Arc<dyn DeviceOpener>,
    config: DeviceConfig,
    timing: TimingConfig,
    events: Arc<dyn EventSink>,
    /// Held for the whole of every start and stop.
    lifecycle: Mutex<()>,
    state: RwLock<ResourceState>,
    handle: Mutex<Option<Box<dyn CameraDevice>>>,
    info: RwLock<Option<DeviceInfo>>,
    /// Bumped on every Idle → Active transition.
    generation: AtomicU64,
}

impl ResourceManager {
    pub fn new(opener: Arc<dyn DeviceOpener>, config: DeviceConfig, timing: TimingConfig) -> Self {
        Self {
            opener,
            config,
            timing,
            events: Arc::new(TracingSink),
            lifecycle: Mutex::new(()),
            state: RwLock::new(ResourceState::Idle),
            handle: Mutex::new(None),
            info: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Sends lifecycle events to `events` instead of `tracing`.
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub(crate) fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// A scanner over the same devices and event sink.
    pub fn scanner(&self) -> DeviceScanner {
        DeviceScanner::new(
            Arc::clone(&self.opener),
            self.config.clone(),
            self.timing.clone(),
            Arc::clone(&self.events),
        )
    }

    /// Starts the camera; true once it is active.
    pub fn start(&self) -> bool {
        self.try_start().is_ok()
    }

    /// Starts the camera, reporting why it could not.
    ///
    /// Blocks while another start or stop is running. Returns immediately
    /// when the camera is already active.
    pub fn try_start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();

        if *self.state.read() == ResourceState::Active {
            tracing::debug!("Camera already active, skipping startup");
            return Ok(());
        }
        *self.state.write() = ResourceState::Opening;

        let candidates = self.scanner().scan();
        let ctx = StrategyContext {
            opener: self.opener.as_ref(),
            config: &self.config,
            timing: &self.timing,
        };

        let mut denied: Option<String> = None;
        let mut last_error: Option<CameraError> = None;

        for strategy in OpenStrategy::plan(&candidates) {
            let name = strategy.name();
            self.events.emit(&CameraEvent::StrategyAttempted {
                strategy: name.clone(),
                device: strategy.device_id(),
                backend: strategy.backend(),
            });

            match strategy.attempt(&ctx) {
                Ok(device) => {
                    let mut info = device.info();
                    info.strategy = Some(name.clone());
                    *self.handle.lock() = Some(device);
                    *self.info.write() = Some(info.clone());
                    self.generation.fetch_add(1, Ordering::SeqCst);
                    *self.state.write() = ResourceState::Active;

                    self.events.emit(&CameraEvent::CameraActivated {
                        strategy: name,
                        device: info.device_id,
                        width: info.width,
                        height: info.height,
                    });
                    return Ok(());
                }
                Err(e) => {
                    self.events.emit(&CameraEvent::StrategyFailed {
                        strategy: name,
                        device: strategy.device_id(),
                        reason: e.to_string(),
                    });
                    if let CameraError::PermissionDenied(ref message) = e {
                        denied = Some(message.clone());
                    }
                    last_error = Some(e);
                }
            }
        }

        *self.state.write() = ResourceState::Idle;

        let error = match denied {
            Some(message) => CaptureError::PermissionDenied(message),
            None => CaptureError::HardwareUnavailable(
                last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no camera devices found".into()),
            ),
        };
        self.events.emit(&CameraEvent::CameraStartFailed {
            reason: error.to_string(),
        });
        Err(error)
    }

    /// Releases the handle. Safe to call at any time, any number of times.
    pub fn stop(&self) {
        let _lifecycle = self.lifecycle.lock();
        *self.state.write() = ResourceState::Closing;

        let handle = self.handle.lock().take();
        let released = handle.is_some();
        if let Some(mut device) = handle {
            device.close();
        }
        *self.info.write() = None;
        *self.state.write() = ResourceState::Idle;

        self.events.emit(&CameraEvent::CameraStopped { released });
    }

    pub fn state(&self) -> ResourceState {
        *self.state.read()
    }

    pub fn is_active(&self) -> bool {
        self.state() == ResourceState::Active
    }

    /// Number of times the camera has become active.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ResourceStatus {
        let state = self.state();
        let device_info = self.info.read().clone();
        ResourceStatus {
            active: state == ResourceState::Active,
            opened: device_info.is_some(),
            state,
            device_info,
        }
    }

    /// Reads one frame from the active handle.
    pub fn read_frame(&self) -> std::result::Result<Frame, CameraError> {
        if !self.is_active() {
            return Err(CameraError::NotInitialized);
        }
        match self.handle.lock().as_mut() {
            Some(device) => device.read_frame(),
            None => Err(CameraError::NotInitialized),
        }
    }

    /// Scans and probes devices without disturbing the camera.
    ///
    /// An active camera is reported from its own handle and nothing is
    /// opened. An idle scan holds the lifecycle lock, so a concurrent start
    /// waits for it to finish.
    pub fn survey(&self) -> DeviceSurvey {
        let _lifecycle = self.lifecycle.lock();

        if *self.state.read() == ResourceState::Active {
            if let Some(info) = self.info.read().clone() {
                let tier = match info.backend {
                    Backend::Native => AccessTier::Native,
                    Backend::Auto => AccessTier::Auto,
                };
                return DeviceSurvey {
                    scan: ScanReport {
                        tier: Some(tier),
                        devices: vec![info.device_id],
                    },
                    details: vec![DeviceDetail {
                        device_id: info.device_id,
                        resolution: Some(format!("{}x{}", info.width, info.height)),
                        fps: Some(info.fps),
                        frame_capture: true,
                        error: None,
                    }],
                };
            }
        }

        let scanner = self.scanner();
        let scan = scanner.scan_report();
        let details = scanner.probe_details(&scan.devices);
        DeviceSurvey { scan, details }
    }

    /// Checks whether the platform lets us open the camera.
    ///
    /// An active camera proves access; otherwise device 0 is briefly opened
    /// under the lifecycle lock.
    pub fn check_access(&self) -> PermissionStatus {
        let _lifecycle = self.lifecycle.lock();
        if *self.state.read() == ResourceState::Active {
            return PermissionStatus::Granted;
        }
        match self.opener.open(&OpenRequest::new(0, Backend::Auto)) {
            Ok(mut device) => {
                device.close();
                PermissionStatus::Granted
            }
            Err(CameraError::DeviceNotFound(_)) => PermissionStatus::Unknown,
            Err(e) => {
                tracing::debug!(error = %e, "Camera could not be opened for access check");
                PermissionStatus::DeniedOrUnknown
            }
        }
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        if let Some(mut device) = self.handle.get_mut().take() {
            device.close();
        }
    }
}
