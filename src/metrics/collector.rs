//! Metrics collection and registry.

use crate::pipeline::StatisticsSnapshot;
use parking_lot::Mutex;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Capture state pushed into the registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Whether the camera is currently active.
    pub camera_active: bool,
    pub total_captures: u64,
    pub successful_captures: u64,
    pub failed_captures: u64,
    /// Mean latency of successful captures, in seconds.
    pub average_capture_seconds: f64,
    /// Statistics epoch the counts belong to; it changes on every reset.
    pub epoch: u64,
}

impl MetricsSnapshot {
    pub fn from_statistics(stats: &StatisticsSnapshot, camera_active: bool) -> Self {
        Self {
            camera_active,
            total_captures: stats.total_captures,
            successful_captures: stats.successful_captures,
            failed_captures: stats.failed_captures,
            average_capture_seconds: stats.average_capture_time,
            epoch: stats.epoch,
        }
    }
}

/// Last counts pushed, so counters survive statistics resets.
#[derive(Debug, Default)]
struct Seen {
    epoch: u64,
    total: u64,
    successful: u64,
    failed: u64,
}

/// Prometheus registry for capture metrics.
pub struct MetricsRegistry {
    registry: Registry,

    captures_total: IntCounter,
    captures_successful: IntCounter,
    captures_failed: IntCounter,
    capture_seconds_average: Gauge,
    camera_active: IntGauge,

    seen: Mutex<Seen>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let captures_total = IntCounter::new(
            "camera_desk_captures_total",
            "Capture attempts, successful or not",
        )?;
        let captures_successful = IntCounter::new(
            "camera_desk_captures_successful_total",
            "Captures that produced a stored image",
        )?;
        let captures_failed = IntCounter::new(
            "camera_desk_captures_failed_total",
            "Captures that failed",
        )?;
        let capture_seconds_average = Gauge::new(
            "camera_desk_capture_seconds_average",
            "Mean latency of successful captures since the camera started",
        )?;
        let camera_active = IntGauge::new(
            "camera_desk_camera_active",
            "Camera state (1=active, 0=idle)",
        )?;

        registry.register(Box::new(captures_total.clone()))?;
        registry.register(Box::new(captures_successful.clone()))?;
        registry.register(Box::new(captures_failed.clone()))?;
        registry.register(Box::new(capture_seconds_average.clone()))?;
        registry.register(Box::new(camera_active.clone()))?;

        Ok(Self {
            registry,
            captures_total,
            captures_successful,
            captures_failed,
            capture_seconds_average,
            camera_active,
            seen: Mutex::new(Seen::default()),
        })
    }

    /// Updates all metrics from a snapshot.
    ///
    /// Counters only move forward. A snapshot from a new epoch counts from
    /// zero, so all of its counts are added as fresh increments.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.camera_active.set(i64::from(snapshot.camera_active));
        self.capture_seconds_average
            .set(snapshot.average_capture_seconds);

        let mut seen = self.seen.lock();
        if seen.epoch != snapshot.epoch {
            *seen = Seen {
                epoch: snapshot.epoch,
                ..Seen::default()
            };
        }
        advance(&self.captures_total, &mut seen.total, snapshot.total_captures);
        advance(
            &self.captures_successful,
            &mut seen.successful,
            snapshot.successful_captures,
        );
        advance(&self.captures_failed, &mut seen.failed, snapshot.failed_captures);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance(counter: &IntCounter, last: &mut u64, now: u64) {
    let delta = now.saturating_sub(*last);
    if delta > 0 {
        counter.inc_by(delta);
    }
    *last = now;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(total: u64, successful: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            camera_active: true,
            total_captures: total,
            successful_captures: successful,
            failed_captures: total - successful,
            average_capture_seconds: 0.25,
            epoch: 0,
        }
    }

    fn after_reset(epoch: u64, total: u64, successful: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            epoch,
            ..snapshot(total, successful)
        }
    }

    #[test]
    fn test_registry_creation() {
        assert!(MetricsRegistry::new().is_ok());
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();
        registry.update(&snapshot(5, 4));

        let output = registry.encode().unwrap();
        assert!(output.contains("camera_desk_captures_total 5"));
        assert!(output.contains("camera_desk_captures_successful_total 4"));
        assert!(output.contains("camera_desk_captures_failed_total 1"));
        assert!(output.contains("camera_desk_capture_seconds_average 0.25"));
        assert!(output.contains("camera_desk_camera_active 1"));
    }

    #[test]
    fn test_counters_survive_reset() {
        let registry = MetricsRegistry::new().unwrap();
        registry.update(&snapshot(5, 4));
        registry.update(&snapshot(5, 4));
        registry.update(&after_reset(1, 2, 2));

        let output = registry.encode().unwrap();
        assert!(output.contains("camera_desk_captures_total 7"));
        assert!(output.contains("camera_desk_captures_successful_total 6"));
    }

    #[test]
    fn test_reset_back_to_same_count_is_not_lost() {
        let registry = MetricsRegistry::new().unwrap();
        registry.update(&snapshot(3, 3));
        // Reset, then exactly three more captures before the next push.
        registry.update(&after_reset(1, 3, 3));

        let output = registry.encode().unwrap();
        assert!(output.contains("camera_desk_captures_total 6"));
        assert!(output.contains("camera_desk_captures_successful_total 6"));
    }

    #[test]
    fn test_epochs_follow_pipeline_resets() {
        let mut stats = crate::pipeline::CaptureStatistics::default();
        let registry = MetricsRegistry::new().unwrap();
        let now = chrono::Local::now();

        stats.record_success(std::time::Duration::from_millis(10), now);
        registry.update(&MetricsSnapshot::from_statistics(&stats.snapshot(), true));
        stats.reset();
        stats.record_success(std::time::Duration::from_millis(10), now);
        registry.update(&MetricsSnapshot::from_statistics(&stats.snapshot(), true));

        assert!(registry.encode().unwrap().contains("camera_desk_captures_total 2"));
    }

    #[test]
    fn test_from_statistics() {
        let stats = crate::pipeline::CaptureStatistics::default().snapshot();
        let snapshot = MetricsSnapshot::from_statistics(&stats, false);
        assert_eq!(snapshot, MetricsSnapshot::default());
    }
}
