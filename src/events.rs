//! Typed lifecycle and capture events.
//!
//! Scanning, lifecycle and capture report what they are doing through an
//! [`EventSink`] instead of logging inline. The default [`TracingSink`]
//! forwards to `tracing`; [`EventLog`] keeps them in memory.

use crate::capture::{Backend, CameraError};
use crate::error::CaptureError;
use crate::scanner::AccessTier;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;

/// Something worth reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CameraEvent {
    ScanStarted {
        candidates: Vec<u32>,
    },
    TierAttempted {
        tier: AccessTier,
    },
    DeviceProbed {
        device: u32,
        tier: AccessTier,
        resolution: Option<(u32, u32)>,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ScanFinished {
        tier: Option<AccessTier>,
        devices: Vec<u32>,
    },
    StrategyAttempted {
        strategy: String,
        device: u32,
        backend: Backend,
    },
    StrategyFailed {
        strategy: String,
        device: u32,
        reason: String,
    },
    CameraActivated {
        strategy: String,
        device: u32,
        width: u32,
        height: u32,
    },
    CameraStartFailed {
        reason: String,
    },
    CameraStopped {
        released: bool,
    },
    CaptureSucceeded {
        id: String,
        #[serde(with = "duration_secs")]
        latency: Duration,
    },
    CaptureFailed {
        attempt: u64,
        reason: String,
    },
    StreamEnded {
        frames: u64,
        consecutive_errors: u32,
    },
}

impl CameraEvent {
    pub(crate) fn probe(
        device: u32,
        tier: AccessTier,
        resolution: Option<(u32, u32)>,
        result: Result<(), &CameraError>,
    ) -> Self {
        CameraEvent::DeviceProbed {
            device,
            tier,
            resolution,
            ok: result.is_ok(),
            reason: result.err().map(ToString::to_string),
        }
    }

    pub(crate) fn capture_failed(attempt: u64, error: &CaptureError) -> Self {
        CameraEvent::CaptureFailed {
            attempt,
            reason: error.to_string(),
        }
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

/// Receives events. Must not block for long; emitters hold no locks the
/// sink could contend on, except during `start`/`stop`.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &CameraEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &CameraEvent) {
        match event {
            CameraEvent::ScanStarted { candidates } => {
                tracing::info!(?candidates, "Scanning camera devices")
            }
            CameraEvent::TierAttempted { tier } => tracing::debug!(%tier, "Trying access tier"),
            CameraEvent::DeviceProbed {
                device,
                tier,
                resolution,
                ok,
                reason,
            } => {
                if *ok {
                    tracing::debug!(device, %tier, ?resolution, "Device produced valid frames");
                } else {
                    tracing::debug!(device, %tier, ?resolution, reason = reason.as_deref().unwrap_or(""), "Device probe failed");
                }
            }
            CameraEvent::ScanFinished { tier, devices } => {
                tracing::info!(?tier, ?devices, "Camera scan complete")
            }
            CameraEvent::StrategyAttempted {
                strategy,
                device,
                backend,
            } => tracing::debug!(strategy, device, %backend, "Attempting open strategy"),
            CameraEvent::StrategyFailed {
                strategy,
                device,
                reason,
            } => tracing::warn!(strategy, device, reason, "Open strategy failed"),
            CameraEvent::CameraActivated {
                strategy,
                device,
                width,
                height,
            } => tracing::info!(strategy, device, width, height, "Camera active"),
            CameraEvent::CameraStartFailed { reason } => {
                tracing::error!(reason, "Camera start failed")
            }
            CameraEvent::CameraStopped { released } => {
                tracing::info!(released, "Camera stopped")
            }
            CameraEvent::CaptureSucceeded { id, latency } => {
                tracing::info!(id, latency_ms = latency.as_millis() as u64, "Image captured")
            }
            CameraEvent::CaptureFailed { attempt, reason } => {
                tracing::warn!(attempt, reason, "Capture failed")
            }
            CameraEvent::StreamEnded {
                frames,
                consecutive_errors,
            } => tracing::info!(frames, consecutive_errors, "Frame stream ended"),
        }
    }
}

/// Buffers events in memory, optionally forwarding them to another sink.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<CameraEvent>>,
    forward: Option<Box<dyn EventSink>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records events and also passes them to `sink`.
    pub fn forwarding(sink: impl EventSink + 'static) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            forward: Some(Box::new(sink)),
        }
    }

    /// Copies out everything recorded so far.
    pub fn snapshot(&self) -> Vec<CameraEvent> {
        self.events.lock().clone()
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<CameraEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: &CameraEvent) {
        self.events.lock().push(event.clone());
        if let Some(ref forward) = self.forward {
            forward.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_records_in_order() {
        let log = EventLog::forwarding(TracingSink);
        log.emit(&CameraEvent::TierAttempted {
            tier: AccessTier::Native,
        });
        log.emit(&CameraEvent::CameraStopped { released: false });

        let events = log.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], CameraEvent::CameraStopped { .. }));
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = CameraEvent::CaptureSucceeded {
            id: "20240101_120000_p001.jpg".into(),
            latency: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "capture_succeeded");
        assert_eq!(json["latency"], 1.5);
    }
}
