//! Camera discovery.
//!
//! Probes a small candidate set of device identifiers through escalating
//! access tiers and reports which ones deliver readable frames. The first
//! tier that finds anything wins; later tiers are only tried when every
//! earlier one came back empty.

use crate::capture::{
    count_valid_reads, Backend, CameraError, DeviceConfig, DeviceOpener, OpenRequest,
    TimingConfig,
};
use crate::events::{CameraEvent, EventSink};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Reads per probe in the fixed-property tiers.
const PROBE_READS: u32 = 3;
/// Valid reads a fixed-property probe needs.
const PROBE_REQUIRED: u32 = 2;

/// An ordered fallback for reaching a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    /// Native backend with the configured property set.
    Native,
    /// Platform-chosen backend with the configured property set.
    Auto,
    /// Platform-chosen backend at each sweep resolution, largest first.
    ResolutionSweep,
}

impl AccessTier {
    /// Every tier, in escalation order.
    pub const ALL: [AccessTier; 3] = [
        AccessTier::Native,
        AccessTier::Auto,
        AccessTier::ResolutionSweep,
    ];

    pub fn backend(self) -> Backend {
        match self {
            AccessTier::Native => Backend::Native,
            AccessTier::Auto | AccessTier::ResolutionSweep => Backend::Auto,
        }
    }
}

impl std::fmt::Display for AccessTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessTier::Native => f.write_str("native"),
            AccessTier::Auto => f.write_str("auto"),
            AccessTier::ResolutionSweep => f.write_str("resolution-sweep"),
        }
    }
}

/// Outcome of a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Tier that produced the devices, if any did.
    pub tier: Option<AccessTier>,
    /// Qualifying device identifiers, ascending.
    pub devices: Vec<u32>,
}

/// What a single direct probe of a device saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDetail {
    pub device_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    pub frame_capture: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Probes candidate devices.
pub struct DeviceScanner {
    opener: Arc<dyn DeviceOpener>,
    config: DeviceConfig,
    timing: TimingConfig,
    events: Arc<dyn EventSink>,
}

impl DeviceScanner {
    pub fn new(
        opener: Arc<dyn DeviceOpener>,
        config: DeviceConfig,
        timing: TimingConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            opener,
            config,
            timing,
            events,
        }
    }

    /// Device identifiers known to produce valid frames, or empty.
    pub fn scan(&self) -> Vec<u32> {
        self.scan_report().devices
    }

    /// Runs the tiers and reports which one succeeded.
    pub fn scan_report(&self) -> ScanReport {
        let mut candidates = self.config.candidates.clone();
        candidates.sort_unstable();
        candidates.dedup();
        self.events.emit(&CameraEvent::ScanStarted {
            candidates: candidates.clone(),
        });

        let mut report = ScanReport::default();
        for tier in AccessTier::ALL {
            self.events.emit(&CameraEvent::TierAttempted { tier });
            let devices: Vec<u32> = candidates
                .iter()
                .copied()
                .filter(|&device| self.probe(device, tier).is_ok())
                .collect();
            if !devices.is_empty() {
                report = ScanReport {
                    tier: Some(tier),
                    devices,
                };
                break;
            }
        }

        self.events.emit(&CameraEvent::ScanFinished {
            tier: report.tier,
            devices: report.devices.clone(),
        });
        report
    }

    /// Probes one device through one tier, returning the resolution that worked.
    pub fn probe(&self, device: u32, tier: AccessTier) -> Result<(u32, u32), CameraError> {
        match tier {
            AccessTier::Native | AccessTier::Auto => {
                let resolution = (self.config.width, self.config.height);
                let request =
                    OpenRequest::new(device, tier.backend()).with_format(self.config.format());
                let result = self.probe_request(&request, PROBE_READS, PROBE_REQUIRED);
                self.events.emit(&CameraEvent::probe(
                    device,
                    tier,
                    Some(resolution),
                    result.as_ref().map(|_| ()),
                ));
                result.map(|_| resolution)
            }
            AccessTier::ResolutionSweep => {
                let mut last_error = CameraError::DeviceNotFound(format!("device {device}"));
                for &(width, height) in &self.config.sweep_resolutions {
                    let request = OpenRequest::new(device, tier.backend())
                        .with_format(self.config.format_at(width, height));
                    let result = self.probe_request(&request, 1, 1);
                    self.events.emit(&CameraEvent::probe(
                        device,
                        tier,
                        Some((width, height)),
                        result.as_ref().map(|_| ()),
                    ));
                    match result {
                        Ok(()) => return Ok((width, height)),
                        Err(e) => last_error = e,
                    }
                }
                Err(last_error)
            }
        }
    }

    /// Opens, warms up, validates and always closes a test handle.
    fn probe_request(
        &self,
        request: &OpenRequest,
        reads: u32,
        required: u32,
    ) -> Result<(), CameraError> {
        let mut device = self.opener.open(request)?;
        sleep(self.timing.scan_warmup());
        let (ok, last_error) = count_valid_reads(device.as_mut(), reads, required, Duration::ZERO);
        device.close();

        if ok >= required {
            Ok(())
        } else {
            Err(last_error.unwrap_or_else(|| {
                CameraError::CaptureFailed(format!("{ok}/{reads} valid reads"))
            }))
        }
    }

    /// Opens each device as the platform sees fit and reports what it offers.
    pub fn probe_details(&self, devices: &[u32]) -> Vec<DeviceDetail> {
        devices
            .iter()
            .map(|&device_id| match self.opener.open(&OpenRequest::new(device_id, Backend::Auto)) {
                Ok(mut handle) => {
                    let info = handle.info();
                    let read = handle.read_frame();
                    handle.close();
                    DeviceDetail {
                        device_id,
                        resolution: Some(format!("{}x{}", info.width, info.height)),
                        fps: Some(info.fps),
                        frame_capture: read.is_ok(),
                        error: read.err().map(|e| e.to_string()),
                    }
                }
                Err(e) => DeviceDetail {
                    device_id,
                    resolution: None,
                    fps: None,
                    frame_capture: false,
                    error: Some(e.to_string()),
                },
            })
            .collect()
    }
}

fn sleep(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}
