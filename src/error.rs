//! Failure taxonomy surfaced to callers.

use crate::capture::CameraError;
use crate::pipeline::StorageError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Why a frame failed the quality gate.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityRejection {
    #[error("captured frame is empty")]
    Empty,

    #[error("image too small: {width}x{height} (minimum {minimum}x{minimum})")]
    TooSmall {
        width: u32,
        height: u32,
        minimum: u32,
    },

    #[error("image too dark (brightness {mean:.1}, minimum {threshold:.1})")]
    TooDark { mean: f64, threshold: f64 },

    #[error("image too bright (brightness {mean:.1}, maximum {threshold:.1})")]
    TooBright { mean: f64, threshold: f64 },
}

/// Errors returned by camera operations.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    /// No device opens or validates, or the camera is not active.
    #[error("camera hardware unavailable: {0}")]
    HardwareUnavailable(String),

    #[error("camera access denied: {0}")]
    PermissionDenied(String),

    #[error("camera access could not be determined: {0}")]
    Unknown(String),

    /// Every read in the retry budget failed.
    #[error("failed to read frame after {attempts} attempts: {source}")]
    FrameReadFailure { attempts: u32, source: CameraError },

    #[error("quality check failed: {0}")]
    QualityRejected(#[from] QualityRejection),

    #[error("debounce delay active ({remaining:?} remaining)")]
    DebounceActive { remaining: Duration },

    #[error("failed to persist image: {0}")]
    PersistFailure(String),

    #[error("{service} failed: {message}")]
    ExternalServiceFailure {
        service: &'static str,
        message: String,
    },
}

impl CaptureError {
    /// Short machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureError::HardwareUnavailable(_) => "hardware_unavailable",
            CaptureError::PermissionDenied(_) => "permission_denied",
            CaptureError::Unknown(_) => "unknown",
            CaptureError::FrameReadFailure { .. } => "frame_read_failure",
            CaptureError::QualityRejected(_) => "quality_rejected",
            CaptureError::DebounceActive { .. } => "debounce_active",
            CaptureError::PersistFailure(_) => "persist_failure",
            CaptureError::ExternalServiceFailure { .. } => "external_service_failure",
        }
    }
}

impl From<StorageError> for CaptureError {
    fn from(e: StorageError) -> Self {
        CaptureError::PersistFailure(e.to_string())
    }
}

/// Convenience alias for camera operation results.
pub type Result<T> = std::result::Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_rejection_message() {
        let err = CaptureError::from(QualityRejection::TooSmall {
            width: 40,
            height: 30,
            minimum: 50,
        });
        assert_eq!(err.kind(), "quality_rejected");
        assert_eq!(
            err.to_string(),
            "quality check failed: image too small: 40x30 (minimum 50x50)"
        );
    }

    #[test]
    fn test_storage_error_becomes_persist_failure() {
        let err = CaptureError::from(StorageError::Empty("a.jpg".into()));
        assert!(matches!(err, CaptureError::PersistFailure(_)));
    }
}
