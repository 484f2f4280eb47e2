//! Command facade over the camera.
//!
//! [`CameraService`] maps each client command onto one core operation and
//! returns a serialisable [`Outcome`] carrying a `success` flag. It also
//! talks to the optional text-extraction and speech collaborators, which
//! are called once per request and never retried.

use crate::capture::{CaptureConfig, DeviceOpener, FileConfig, Frame, StreamConfig};
use crate::error::{CaptureError, QualityRejection};
use crate::manager::{DeviceSurvey, PermissionStatus, ResourceManager, ResourceStatus};
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{
    round_to, ArtifactStore, CapturePipeline, CapturedImage, StatisticsSnapshot, StorageError,
};
use crate::scanner::{AccessTier, DeviceDetail};
use crate::stream::FrameStream;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

/// Extracts text from a stored image.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, artifact_id: &str) -> Result<String, CollaboratorError>;
}

/// Turns text into a stored audio artifact.
pub trait SpeechSynthesizer: Send + Sync {
    /// Returns the identifier of the audio artifact.
    fn synthesize(&self, text: &str) -> Result<String, CollaboratorError>;
}

/// Errors returned by service commands.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("no text provided")]
    EmptyText,
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Capture(e) => e.kind(),
            ServiceError::ArtifactNotFound(_) => "artifact_not_found",
            ServiceError::EmptyText => "empty_text",
        }
    }
}

/// Result of a command as reported to a client.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

impl<T> Outcome<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
        }
    }

    pub fn failed(error: &ServiceError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }
}

impl<T, E: Into<ServiceError>> From<Result<T, E>> for Outcome<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Outcome::ok(data),
            Err(e) => Outcome::failed(&e.into()),
        }
    }
}

/// Text pulled out of a stored image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextExtraction {
    pub artifact: String,
    pub text: String,
    /// Seconds spent in the extractor.
    pub processing_time: f64,
    pub text_length: usize,
    pub word_count: usize,
    pub line_count: usize,
}

/// Audio produced from text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeechArtifact {
    pub artifact: String,
    pub processing_time: f64,
}

/// Whether the image store accepts new files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAccess {
    Writable,
    NotWritable,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceScan {
    pub tier: Option<AccessTier>,
    pub available_devices: Vec<u32>,
    pub device_details: Vec<DeviceDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PermissionsCheck {
    pub camera_access: PermissionStatus,
    pub file_access: FileAccess,
}

/// Troubleshooting report.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub timestamp: DateTime<Local>,
    pub version: &'static str,
    pub platform: &'static str,
    pub camera_status: ResourceStatus,
    pub device_scan: DeviceScan,
    pub permissions_check: PermissionsCheck,
    pub recommendations: Vec<String>,
}

impl Diagnostics {
    fn recommend(&mut self) {
        let mut out = Vec::new();
        if self.device_scan.available_devices.is_empty() {
            out.push("No camera devices detected. Check hardware connections.");
        }
        if !self.camera_status.opened {
            out.push("Camera not opened. Check permissions and device availability.");
        }
        match self.permissions_check.camera_access {
            PermissionStatus::Granted => {}
            PermissionStatus::DeniedOrUnknown => out.push(
                "Camera could not be opened. Another application may be using it, or access is denied.",
            ),
            PermissionStatus::Unknown => out.push(
                "Camera permissions unclear. Check the operating system's camera privacy settings.",
            ),
        }
        if self.permissions_check.file_access == FileAccess::NotWritable {
            out.push("Image directory is not writable.");
        }
        self.recommendations = out.into_iter().map(String::from).collect();
    }
}

/// Diagnostics plus the result of an automatic start.
#[derive(Debug, Clone, Serialize)]
pub struct Troubleshooting {
    pub diagnostics: Diagnostics,
    pub startup_attempted: bool,
    pub startup_successful: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_error: Option<String>,
    /// Status after the start attempt.
    pub current_status: ResourceStatus,
    pub recommendations: Vec<String>,
}

/// Brightness class of a test frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Exposure {
    Normal,
    Extreme,
}

impl Exposure {
    pub fn classify(mean: f64) -> Self {
        if (20.0..=240.0).contains(&mean) {
            Exposure::Normal
        } else {
            Exposure::Extreme
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrightnessReport {
    pub mean: f64,
    pub std: f64,
    pub status: Exposure,
}

/// Properties of one frame read straight from the active camera.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub dimensions: String,
    pub channels: u8,
    pub total_pixels: u64,
    pub brightness: BrightnessReport,
    pub timestamp: DateTime<Local>,
}

impl FrameReport {
    fn new(frame: &Frame, mean: f64, std: f64) -> Self {
        Self {
            dimensions: format!("{}x{}", frame.width(), frame.height()),
            channels: frame.channels(),
            total_pixels: frame.pixel_count() as u64,
            brightness: BrightnessReport {
                mean: round_to(mean, 2),
                std: round_to(std, 2),
                status: Exposure::classify(mean),
            },
            timestamp: Local::now(),
        }
    }
}

/// The camera as seen by clients.
pub struct CameraService {
    manager: Arc<ResourceManager>,
    pipeline: CapturePipeline,
    stream_config: StreamConfig,
    extractor: Option<Arc<dyn TextExtractor>>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
}

impl CameraService {
    pub fn new(
        manager: Arc<ResourceManager>,
        store: Arc<dyn ArtifactStore>,
        capture: CaptureConfig,
        stream: StreamConfig,
    ) -> Self {
        Self {
            pipeline: CapturePipeline::new(Arc::clone(&manager), store, capture),
            manager,
            stream_config: stream,
            extractor: None,
            synthesizer: None,
        }
    }

    /// Builds the whole stack from a configuration file's settings.
    pub fn from_config(
        opener: Arc<dyn DeviceOpener>,
        store: Arc<dyn ArtifactStore>,
        config: &FileConfig,
    ) -> Self {
        let manager = ResourceManager::new(opener, config.device.clone(), config.timing.clone());
        Self::new(
            Arc::new(manager),
            store,
            config.capture.clone(),
            config.stream.clone(),
        )
    }

    pub fn with_text_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_speech_synthesizer(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn manager(&self) -> &Arc<ResourceManager> {
        &self.manager
    }

    pub fn pipeline(&self) -> &CapturePipeline {
        &self.pipeline
    }

    pub fn start_camera(&self) -> Outcome<ResourceStatus> {
        self.manager.try_start().map(|()| self.manager.status()).into()
    }

    pub fn stop_camera(&self) -> Outcome<ResourceStatus> {
        self.manager.stop();
        Outcome::ok(self.manager.status())
    }

    pub fn status(&self) -> Outcome<ResourceStatus> {
        Outcome::ok(self.manager.status())
    }

    pub fn capture(&self) -> Outcome<CapturedImage> {
        self.pipeline.capture().into()
    }

    /// A new live stream; empty when the camera is not active.
    pub fn stream(&self) -> FrameStream {
        FrameStream::new(Arc::clone(&self.manager), self.stream_config.clone())
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.pipeline.statistics()
    }

    pub fn reset_statistics(&self) -> Outcome<StatisticsSnapshot> {
        self.pipeline.reset_statistics();
        Outcome::ok(self.pipeline.statistics())
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::from_statistics(&self.pipeline.statistics(), self.manager.is_active())
    }

    /// Scans devices, checks access and storage, and suggests fixes.
    ///
    /// An active camera is described from its own handle rather than probed.
    pub fn diagnostics(&self) -> Diagnostics {
        let DeviceSurvey {
            scan,
            details: device_details,
        } = self.manager.survey();

        let file_access = if self.pipeline.store().is_writable() {
            FileAccess::Writable
        } else {
            FileAccess::NotWritable
        };

        let mut report = Diagnostics {
            timestamp: Local::now(),
            version: crate::VERSION,
            platform: std::env::consts::OS,
            camera_status: self.manager.status(),
            device_scan: DeviceScan {
                tier: scan.tier,
                available_devices: scan.devices,
                device_details,
            },
            permissions_check: PermissionsCheck {
                camera_access: self.manager.check_access(),
                file_access,
            },
            recommendations: Vec::new(),
        };
        report.recommend();
        report
    }

    /// Diagnoses the camera and, if it is idle, tries to start it.
    pub fn troubleshoot(&self) -> Troubleshooting {
        let diagnostics = self.diagnostics();
        let startup_attempted = !self.manager.is_active();
        let startup_error = if startup_attempted {
            self.manager.try_start().err().map(|e| e.to_string())
        } else {
            None
        };

        let mut recommendations = diagnostics.recommendations.clone();
        if let Some(ref error) = startup_error {
            recommendations.push(format!("Automatic start failed: {error}"));
        }

        Troubleshooting {
            current_status: self.manager.status(),
            startup_successful: startup_attempted && startup_error.is_none(),
            startup_attempted,
            startup_error,
            recommendations,
            diagnostics,
        }
    }

    /// Reads one frame and reports its size and brightness.
    pub fn frame_report(&self) -> Outcome<FrameReport> {
        self.try_frame_report().into()
    }

    fn try_frame_report(&self) -> Result<FrameReport, CaptureError> {
        if !self.manager.is_active() {
            return Err(CaptureError::HardwareUnavailable(
                "camera not available".into(),
            ));
        }
        let frame = self
            .manager
            .read_frame()
            .map_err(|source| CaptureError::FrameReadFailure {
                attempts: 1,
                source,
            })?;
        let (mean, std) = frame
            .luminance_stats()
            .ok_or(QualityRejection::Empty)?;
        Ok(FrameReport::new(&frame, mean, std))
    }

    /// Runs text extraction on a stored image.
    pub fn extract_text(&self, artifact_id: &str) -> Outcome<TextExtraction> {
        self.try_extract_text(artifact_id).into()
    }

    fn try_extract_text(&self, artifact_id: &str) -> Result<TextExtraction, ServiceError> {
        let extractor = self
            .extractor
            .as_ref()
            .ok_or_else(|| not_configured("text extraction"))?;

        match self.pipeline.store().size(artifact_id) {
            Ok(_) => {}
            Err(StorageError::NotFound(_) | StorageError::InvalidName(_)) => {
                return Err(ServiceError::ArtifactNotFound(artifact_id.to_string()))
            }
            Err(e) => return Err(CaptureError::from(e).into()),
        }

        let started = Instant::now();
        let text = extractor
            .extract(artifact_id)
            .map_err(|e| external("text extraction", e))?;

        Ok(TextExtraction {
            artifact: artifact_id.to_string(),
            processing_time: round_to(started.elapsed().as_secs_f64(), 3),
            text_length: text.chars().count(),
            word_count: text.split_whitespace().count(),
            line_count: text.lines().count(),
            text,
        })
    }

    /// Converts text to speech.
    pub fn synthesize(&self, text: &str) -> Outcome<SpeechArtifact> {
        self.try_synthesize(text).into()
    }

    fn try_synthesize(&self, text: &str) -> Result<SpeechArtifact, ServiceError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ServiceError::EmptyText);
        }
        let synthesizer = self
            .synthesizer
            .as_ref()
            .ok_or_else(|| not_configured("speech synthesis"))?;

        let started = Instant::now();
        let artifact = synthesizer
            .synthesize(text)
            .map_err(|e| external("speech synthesis", e))?;

        Ok(SpeechArtifact {
            artifact,
            processing_time: round_to(started.elapsed().as_secs_f64(), 3),
        })
    }
}

fn not_configured(service: &'static str) -> ServiceError {
    CaptureError::ExternalServiceFailure {
        service,
        message: "not configured".into(),
    }
    .into()
}

fn external(service: &'static str, error: CollaboratorError) -> ServiceError {
    tracing::warn!(service, error = %error, "External service failed");
    CaptureError::ExternalServiceFailure {
        service,
        message: error.0,
    }
    .into()
}
