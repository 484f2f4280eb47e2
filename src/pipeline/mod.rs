//! Debounced, quality-gated still capture.
//!
//! A capture runs its checks in a fixed order: debounce, camera state,
//! frame read (with a small retry budget), quality gate, then persistence.
//! Every attempt is counted in [`CaptureStatistics`], whatever its outcome.

mod naming;
mod quality;
mod stats;
mod storage;

pub use naming::{next_name, page_number};
pub use quality::QualityGate;
pub(crate) use stats::round_to;
pub use stats::{CaptureStatistics, FailureRecord, StatisticsSnapshot};
pub use storage::{ArtifactStore, DirectoryStore, MemoryStore, StorageError};

use crate::capture::{CameraError, CaptureConfig, Frame};
use crate::error::CaptureError;
use crate::events::CameraEvent;
use crate::manager::ResourceManager;
use chrono::Local;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A stored image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturedImage {
    /// Artifact identifier in the store.
    pub id: String,
    pub width: u32,
    pub height: u32,
    /// Encoded size in bytes.
    pub size: u64,
    /// Mean luminance of the frame.
    pub brightness: f64,
    /// Time from request to stored artifact, in seconds.
    pub latency_secs: f64,
}

/// Outcome of one capture: an artifact or a reason, never both.
pub type CaptureResult = Result<CapturedImage, CaptureError>;

/// Statistics tagged with the camera activation they belong to.
struct StatsCell {
    generation: u64,
    stats: CaptureStatistics,
}

/// Captures still images from the shared camera.
pub struct CapturePipeline {
    manager: Arc<ResourceManager>,
    store: Arc<dyn ArtifactStore>,
    config: CaptureConfig,
    gate: QualityGate,
    /// Instant of the last successful capture.
    last_success: Mutex<Option<Instant>>,
    stats: Mutex<StatsCell>,
}

impl CapturePipeline {
    pub fn new(
        manager: Arc<ResourceManager>,
        store: Arc<dyn ArtifactStore>,
        config: CaptureConfig,
    ) -> Self {
        let generation = manager.generation();
        Self {
            gate: QualityGate::from(&config),
            stats: Mutex::new(StatsCell {
                generation,
                stats: CaptureStatistics::new(config.error_log_capacity),
            }),
            last_success: Mutex::new(None),
            manager,
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Captures, checks and stores one image.
    pub fn capture(&self) -> CaptureResult {
        let started = Instant::now();
        let result = self.attempt(started);

        match result {
            Ok(ref image) => {
                *self.last_success.lock() = Some(Instant::now());
                let latency = started.elapsed();
                self.with_stats(|stats| stats.record_success(latency, Local::now()));
                self.manager.events().emit(&CameraEvent::CaptureSucceeded {
                    id: image.id.clone(),
                    latency,
                });
            }
            Err(ref e) => {
                let attempt = self.with_stats(|stats| stats.record_failure(e, Local::now()));
                self.manager
                    .events()
                    .emit(&CameraEvent::capture_failed(attempt, e));
            }
        }
        result
    }

    fn attempt(&self, started: Instant) -> CaptureResult {
        if let Some(remaining) = self.debounce_remaining() {
            return Err(CaptureError::DebounceActive { remaining });
        }

        if !self.manager.is_active() {
            return Err(CaptureError::HardwareUnavailable(
                "camera not active".into(),
            ));
        }

        let frame = self.read_with_retry()?;
        let brightness = self.gate.check(&frame)?;

        let bytes = frame
            .encode_jpeg(self.config.jpeg_quality)
            .map_err(|e| CaptureError::PersistFailure(e.to_string()))?;
        let id = self.persist(&bytes)?;

        Ok(CapturedImage {
            id,
            width: frame.width(),
            height: frame.height(),
            size: bytes.len() as u64,
            brightness,
            latency_secs: started.elapsed().as_secs_f64(),
        })
    }

    /// Time left before another capture may succeed.
    fn debounce_remaining(&self) -> Option<Duration> {
        let last = (*self.last_success.lock())?;
        self.config.debounce().checked_sub(last.elapsed()).filter(|d| !d.is_zero())
    }

    fn read_with_retry(&self) -> Result<Frame, CaptureError> {
        let attempts = self.config.read_attempts.max(1);
        let mut last_error = CameraError::NotInitialized;
        for attempt in 1..=attempts {
            match self.manager.read_frame() {
                Ok(frame) => return Ok(frame),
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "Capture read failed");
                    last_error = e;
                    if attempt < attempts && !self.config.read_retry_delay().is_zero() {
                        std::thread::sleep(self.config.read_retry_delay());
                    }
                }
            }
        }
        Err(CaptureError::FrameReadFailure {
            attempts,
            source: last_error,
        })
    }

    /// Stores the image under the next page name and checks it landed.
    fn persist(&self, bytes: &[u8]) -> Result<String, CaptureError> {
        let existing = self.store.list()?;
        let name = next_name(existing.iter().map(String::as_str), Local::now())
            .ok_or_else(|| CaptureError::PersistFailure("page numbers exhausted".into()))?;

        let id = match self.store.put(&name, bytes) {
            Ok(id) => id,
            // Another capture took the name; its file is not ours to remove.
            Err(e @ StorageError::AlreadyExists(_)) => return Err(e.into()),
            Err(e) => {
                self.discard(&name);
                return Err(e.into());
            }
        };

        match self.store.size(&id) {
            Ok(size) if size > 0 => Ok(id),
            verify => {
                self.discard(&id);
                Err(CaptureError::PersistFailure(match verify {
                    Err(e) => e.to_string(),
                    Ok(_) => format!("stored image {id} is empty"),
                }))
            }
        }
    }

    /// Removes a partial artifact. A missing one is fine.
    fn discard(&self, id: &str) {
        match self.store.delete(id) {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(e) => tracing::warn!(id, error = %e, "Failed to remove partial artifact"),
        }
    }

    fn with_stats<R>(&self, f: impl FnOnce(&mut CaptureStatistics) -> R) -> R {
        let mut cell = self.stats.lock();
        let generation = self.manager.generation();
        if cell.generation != generation {
            cell.stats.reset();
            cell.generation = generation;
        }
        f(&mut cell.stats)
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.with_stats(|stats| stats.snapshot())
    }

    pub fn reset_statistics(&self) {
        self.with_stats(|stats| stats.reset());
        tracing::info!("Capture statistics reset");
    }

    /// Instant of the last successful capture.
    pub fn last_success(&self) -> Option<Instant> {
        *self.last_success.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{DeviceConfig, SimulatedOpener, SimulatedProfile, TimingConfig};

    struct Rig {
        opener: Arc<SimulatedOpener>,
        manager: Arc<ResourceManager>,
        store: Arc<MemoryStore>,
        pipeline: CapturePipeline,
    }

    fn rig(profile: SimulatedProfile, config: CaptureConfig) -> Rig {
        let opener = Arc::new(SimulatedOpener::new().with_device(0, profile));
        let manager = Arc::new(ResourceManager::new(
            opener.clone(),
            DeviceConfig::default(),
            TimingConfig::immediate(),
        ));
        let store = Arc::new(MemoryStore::new());
        let pipeline = CapturePipeline::new(manager.clone(), store.clone(), config);
        Rig {
            opener,
            manager,
            store,
            pipeline,
        }
    }

    fn no_debounce() -> CaptureConfig {
        CaptureConfig {
            debounce_ms: 0,
            read_retry_delay_ms: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_capture_stores_jpeg() {
        // Refuses the configured 640x480, so the camera runs at 200x200.
        let profile = SimulatedProfile {
            resolutions: Some(Vec::new()),
            ..SimulatedProfile::with_frames(200, 200, 128)
        };
        let rig = rig(profile, no_debounce());
        assert!(rig.manager.start());

        let image = rig.pipeline.capture().unwrap();
        assert!(image.id.ends_with("_p001.jpg"));
        assert_eq!((image.width, image.height), (200, 200));
        assert!((image.brightness - 128.0).abs() < 0.01);

        let stored = rig.store.get(&image.id).unwrap();
        assert_eq!(stored.len() as u64, image.size);
        assert_eq!(&stored[..2], &[0xFF, 0xD8]);

        let second = rig.pipeline.capture().unwrap();
        assert!(second.id.ends_with("_p002.jpg"));
    }

    #[test]
    fn test_second_capture_within_debounce_fails() {
        let config = CaptureConfig {
            debounce_ms: 60_000,
            ..no_debounce()
        };
        let rig = rig(SimulatedProfile::default(), config);
        assert!(rig.manager.start());

        rig.pipeline.capture().unwrap();
        let clock = rig.pipeline.last_success();
        assert!(clock.is_some());

        assert!(matches!(
            rig.pipeline.capture(),
            Err(CaptureError::DebounceActive { .. })
        ));
        assert_eq!(rig.pipeline.last_success(), clock);

        let stats = rig.pipeline.statistics();
        assert_eq!(stats.successful_captures, 1);
        assert_eq!(stats.failed_captures, 1);
        assert_eq!(stats.recent_errors[0].kind, "debounce_active");
        assert_eq!(rig.store.len(), 1);
    }

    #[test]
    fn test_capture_allowed_after_debounce_elapses() {
        let config = CaptureConfig {
            debounce_ms: 50,
            ..no_debounce()
        };
        let rig = rig(SimulatedProfile::default(), config);
        assert!(rig.manager.start());

        rig.pipeline.capture().unwrap();
        std::thread::sleep(Duration::from_millis(60));
        let second = rig.pipeline.capture().unwrap();
        assert!(second.id.ends_with("_p002.jpg"));
        assert_eq!(rig.pipeline.statistics().failed_captures, 0);
    }

    #[test]
    fn test_capture_requires_active_camera() {
        let rig = rig(SimulatedProfile::default(), no_debounce());
        assert!(matches!(
            rig.pipeline.capture(),
            Err(CaptureError::HardwareUnavailable(_))
        ));
        assert!(rig.pipeline.last_success().is_none());
    }

    #[test]
    fn test_dark_frame_rejected_and_not_stored() {
        let rig = rig(SimulatedProfile::with_frames(200, 200, 0), no_debounce());
        assert!(rig.manager.start());

        let err = rig.pipeline.capture().unwrap_err();
        assert!(matches!(
            err,
            CaptureError::QualityRejected(crate::error::QualityRejection::TooDark { .. })
        ));
        assert!(rig.store.is_empty());
        assert!(rig.pipeline.last_success().is_none());
    }

    #[test]
    fn test_small_frame_rejected() {
        // Refuses every requested format, so only the direct open succeeds
        // and frames keep the device's own 40x40 size.
        let profile = SimulatedProfile {
            resolutions: Some(Vec::new()),
            ..SimulatedProfile::with_frames(40, 40, 128)
        };
        let rig = rig(profile, no_debounce());
        assert!(rig.manager.start());
        assert_eq!(rig.manager.status().device_info.unwrap().width, 40);

        assert!(matches!(
            rig.pipeline.capture(),
            Err(CaptureError::QualityRejected(
                crate::error::QualityRejection::TooSmall { .. }
            ))
        ));
    }

    #[test]
    fn test_read_failures_exhaust_budget() {
        let rig = rig(SimulatedProfile::default(), no_debounce());
        assert!(rig.manager.start());
        rig.opener.counters().set_fail_reads(true);
        let reads_before = rig.opener.counters().reads();

        assert!(matches!(
            rig.pipeline.capture(),
            Err(CaptureError::FrameReadFailure { attempts: 3, .. })
        ));
        assert_eq!(rig.opener.counters().reads() - reads_before, 3);
    }

    #[test]
    fn test_success_rate_and_average() {
        let rig = rig(SimulatedProfile::default(), no_debounce());
        rig.pipeline.capture().unwrap_err(); // not started
        assert!(rig.manager.start());
        for _ in 0..3 {
            rig.pipeline.capture().unwrap();
        }

        let stats = rig.pipeline.statistics();
        assert_eq!(stats.total_captures, 3);
        assert_eq!(stats.successful_captures, 3);
        assert_eq!(stats.success_rate_percent, 100.0);
        assert!(stats.last_capture_timestamp.is_some());

        rig.opener.counters().set_fail_reads(true);
        rig.pipeline.capture().unwrap_err();
        let stats = rig.pipeline.statistics();
        assert_eq!(stats.success_rate_percent, 75.0);
        let expected = stats.total_capture_time / 3.0;
        assert!((stats.average_capture_time - expected).abs() < 0.002);
    }

    #[test]
    fn test_fresh_start_resets_statistics() {
        let rig = rig(SimulatedProfile::default(), no_debounce());
        assert!(rig.manager.start());
        rig.pipeline.capture().unwrap();
        assert_eq!(rig.pipeline.statistics().total_captures, 1);

        // Idempotent start keeps the counts.
        assert!(rig.manager.start());
        assert_eq!(rig.pipeline.statistics().total_captures, 1);

        rig.manager.stop();
        assert!(rig.manager.start());
        assert_eq!(rig.pipeline.statistics().total_captures, 0);
    }

    #[test]
    fn test_reset_statistics() {
        let rig = rig(SimulatedProfile::default(), no_debounce());
        rig.pipeline.capture().unwrap_err();
        rig.pipeline.reset_statistics();
        assert_eq!(rig.pipeline.statistics().total_captures, 0);
    }

    /// Accepts writes but loses the content.
    struct LossyStore(MemoryStore);

    impl ArtifactStore for LossyStore {
        fn put(&self, name: &str, _bytes: &[u8]) -> Result<String, StorageError> {
            self.0.put(name, &[])
        }
        fn list(&self) -> Result<Vec<String>, StorageError> {
            self.0.list()
        }
        fn size(&self, id: &str) -> Result<u64, StorageError> {
            self.0.size(id)
        }
        fn delete(&self, id: &str) -> Result<(), StorageError> {
            self.0.delete(id)
        }
    }

    #[test]
    fn test_empty_artifact_is_removed() {
        let opener = Arc::new(SimulatedOpener::single());
        let manager = Arc::new(ResourceManager::new(
            opener,
            DeviceConfig::default(),
            TimingConfig::immediate(),
        ));
        let store = Arc::new(LossyStore(MemoryStore::new()));
        let pipeline = CapturePipeline::new(manager.clone(), store.clone(), no_debounce());
        assert!(manager.start());

        assert!(matches!(
            pipeline.capture(),
            Err(CaptureError::PersistFailure(_))
        ));
        assert!(store.0.is_empty());
        assert!(pipeline.last_success().is_none());
    }

    #[test]
    fn test_exhausted_page_numbers_fail_cleanly() {
        let rig = rig(SimulatedProfile::default(), no_debounce());
        rig.store.put("20240101_000000_p4294967295.jpg", b"jpeg").unwrap();
        assert!(rig.manager.start());

        assert!(matches!(
            rig.pipeline.capture(),
            Err(CaptureError::PersistFailure(_))
        ));
        assert_eq!(rig.store.len(), 1);
    }

    /// Stores nothing and refuses to delete.
    struct StuckStore(MemoryStore);

    impl ArtifactStore for StuckStore {
        fn put(&self, name: &str, _bytes: &[u8]) -> Result<String, StorageError> {
            self.0.put(name, &[])
        }
        fn list(&self) -> Result<Vec<String>, StorageError> {
            self.0.list()
        }
        fn size(&self, id: &str) -> Result<u64, StorageError> {
            self.0.size(id)
        }
        fn delete(&self, _id: &str) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }
    }

    #[test]
    fn test_failed_cleanup_still_reports_persist_failure() {
        let manager = Arc::new(ResourceManager::new(
            Arc::new(SimulatedOpener::single()),
            DeviceConfig::default(),
            TimingConfig::immediate(),
        ));
        let store = Arc::new(StuckStore(MemoryStore::new()));
        let pipeline = CapturePipeline::new(manager.clone(), store.clone(), no_debounce());
        assert!(manager.start());

        assert!(matches!(
            pipeline.capture(),
            Err(CaptureError::PersistFailure(_))
        ));
        // The leftover stays visible to the next capture's naming.
        assert_eq!(store.0.len(), 1);
        assert_eq!(pipeline.statistics().failed_captures, 1);
    }

    /// Lists nothing, so every capture picks the same name.
    struct BlindStore(MemoryStore);

    impl ArtifactStore for BlindStore {
        fn put(&self, name: &str, bytes: &[u8]) -> Result<String, StorageError> {
            self.0.put(name, bytes)
        }
        fn list(&self) -> Result<Vec<String>, StorageError> {
            Ok(Vec::new())
        }
        fn size(&self, id: &str) -> Result<u64, StorageError> {
            self.0.size(id)
        }
        fn delete(&self, id: &str) -> Result<(), StorageError> {
            self.0.delete(id)
        }
    }

    #[test]
    fn test_name_collision_keeps_first_image() {
        let manager = Arc::new(ResourceManager::new(
            Arc::new(SimulatedOpener::single()),
            DeviceConfig::default(),
            TimingConfig::immediate(),
        ));
        let store = Arc::new(BlindStore(MemoryStore::new()));
        let pipeline = CapturePipeline::new(manager.clone(), store.clone(), no_debounce());
        assert!(manager.start());

        let first = pipeline.capture().unwrap();
        // Same second, same page: the second write must not replace the first.
        match pipeline.capture() {
            Ok(second) => assert_ne!(second.id, first.id),
            Err(e) => assert!(matches!(e, CaptureError::PersistFailure(_))),
        }
        assert!(store.0.get(&first.id).is_some());
    }
}
