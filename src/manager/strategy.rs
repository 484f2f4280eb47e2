//! Ordered open strategies.
//!
//! `start` walks a flat list of strategies instead of nesting fallbacks:
//! every candidate device through every access tier, then two last-resort
//! attempts on device 0.

use crate::capture::{
    count_valid_reads, Backend, CameraDevice, CameraError, DeviceConfig, DeviceOpener,
    HandleGuard, OpenRequest, TimingConfig,
};
use crate::scanner::AccessTier;
use std::time::Duration;

/// Validation reads allowed per opened handle.
const START_READS: u32 = 5;
/// Device the fallbacks target.
const FALLBACK_DEVICE: u32 = 0;

/// One way of acquiring a validated handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenStrategy {
    /// A scanned device through one access tier.
    Tiered { device_id: u32, tier: AccessTier },
    /// Open without touching properties and give the device a long warm-up.
    DirectExtendedWarmup,
    /// Open, push the property set, and accept a single good read.
    ExplicitProperties,
}

/// What a strategy needs to run.
pub struct StrategyContext<'a> {
    pub opener: &'a dyn DeviceOpener,
    pub config: &'a DeviceConfig,
    pub timing: &'a TimingConfig,
}

impl OpenStrategy {
    /// The full attempt order for a set of scanned devices.
    pub fn plan(candidates: &[u32]) -> Vec<OpenStrategy> {
        candidates
            .iter()
            .flat_map(|&device_id| {
                AccessTier::ALL
                    .into_iter()
                    .map(move |tier| OpenStrategy::Tiered { device_id, tier })
            })
            .chain([
                OpenStrategy::DirectExtendedWarmup,
                OpenStrategy::ExplicitProperties,
            ])
            .collect()
    }

    pub fn name(&self) -> String {
        match self {
            OpenStrategy::Tiered { tier, .. } => tier.to_string(),
            OpenStrategy::DirectExtendedWarmup => "direct-extended-warmup".into(),
            OpenStrategy::ExplicitProperties => "explicit-properties".into(),
        }
    }

    pub fn device_id(&self) -> u32 {
        match self {
            OpenStrategy::Tiered { device_id, .. } => *device_id,
            OpenStrategy::DirectExtendedWarmup | OpenStrategy::ExplicitProperties => {
                FALLBACK_DEVICE
            }
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            OpenStrategy::Tiered { tier, .. } => tier.backend(),
            OpenStrategy::DirectExtendedWarmup | OpenStrategy::ExplicitProperties => {
                Backend::Auto
            }
        }
    }

    /// Opens and validates a handle. On failure nothing stays open.
    pub fn attempt(&self, ctx: &StrategyContext<'_>) -> Result<Box<dyn CameraDevice>, CameraError> {
        let device_id = self.device_id();
        let backend = self.backend();
        match self {
            OpenStrategy::Tiered {
                tier: AccessTier::ResolutionSweep,
                ..
            } => {
                let mut last_error = CameraError::DeviceNotFound(format!("device {device_id}"));
                for &(width, height) in &ctx.config.sweep_resolutions {
                    let request = OpenRequest::new(device_id, backend)
                        .with_format(ctx.config.format_at(width, height));
                    match validated(ctx, &request, ctx.timing.start_warmup(), START_READS) {
                        Ok(device) => return Ok(device),
                        Err(e) => last_error = e,
                    }
                }
                Err(last_error)
            }
            OpenStrategy::Tiered { .. } => {
                let request = OpenRequest::new(device_id, backend).with_format(ctx.config.format());
                validated(ctx, &request, ctx.timing.start_warmup(), START_READS)
            }
            OpenStrategy::DirectExtendedWarmup => {
                let request = OpenRequest::new(device_id, backend);
                validated(ctx, &request, ctx.timing.fallback_warmup(), START_READS)
            }
            OpenStrategy::ExplicitProperties => {
                let request = OpenRequest::new(device_id, backend).with_format(ctx.config.format());
                validated(ctx, &request, ctx.timing.start_warmup(), 1)
            }
        }
    }
}

/// Opens, warms up, and requires one good read within `reads` attempts.
fn validated(
    ctx: &StrategyContext<'_>,
    request: &OpenRequest,
    warmup: Duration,
    reads: u32,
) -> Result<Box<dyn CameraDevice>, CameraError> {
    let mut guard = HandleGuard::new(ctx.opener.open(request)?);
    if !warmup.is_zero() {
        std::thread::sleep(warmup);
    }

    let (ok, last_error) =
        count_valid_reads(guard.device(), reads, 1, ctx.timing.start_backoff());
    if ok == 0 {
        return Err(last_error.unwrap_or_else(|| {
            CameraError::CaptureFailed(format!("no valid frame in {reads} reads"))
        }));
    }
    Ok(guard.take())
}
