//! Quality gate applied before an image is stored.
//!
//! Checks run in a fixed order: emptiness, size, then brightness. The first
//! failing check decides the rejection.

use crate::capture::{CaptureConfig, Frame};
use crate::error::QualityRejection;
use serde::{Deserialize, Serialize};

/// Thresholds for rejecting unusable frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGate {
    /// Smallest accepted width or height.
    pub min_dimension: u32,
    /// Mean luminance below this is too dark.
    pub dark_threshold: f64,
    /// Mean luminance above this is too bright.
    pub bright_threshold: f64,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            min_dimension: 50,
            dark_threshold: 1.0,    // only a fully black frame
            bright_threshold: 250.0, // near saturation
        }
    }
}

impl From<&CaptureConfig> for QualityGate {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            min_dimension: config.min_dimension,
            dark_threshold: config.dark_threshold,
            bright_threshold: config.bright_threshold,
        }
    }
}

impl QualityGate {
    /// Checks a frame, returning its mean luminance when it passes.
    pub fn check(&self, frame: &Frame) -> Result<f64, QualityRejection> {
        if frame.is_empty() || !frame.is_valid() {
            return Err(QualityRejection::Empty);
        }

        if frame.width() < self.min_dimension || frame.height() < self.min_dimension {
            return Err(QualityRejection::TooSmall {
                width: frame.width(),
                height: frame.height(),
                minimum: self.min_dimension,
            });
        }

        let mean = frame.mean_luminance().ok_or(QualityRejection::Empty)?;
        tracing::debug!(brightness = mean, "Frame brightness");

        if mean < self.dark_threshold {
            return Err(QualityRejection::TooDark {
                mean,
                threshold: self.dark_threshold,
            });
        }
        if mean > self.bright_threshold {
            return Err(QualityRejection::TooBright {
                mean,
                threshold: self.bright_threshold,
            });
        }

        Ok(mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, value: u8) -> Frame {
        Frame::rgb(vec![value; (width * height * 3) as usize], width, height, 1)
    }

    #[test]
    fn test_mid_gray_passes() {
        let gate = QualityGate::default();
        let mean = gate.check(&frame(200, 200, 128)).unwrap();
        assert!((mean - 128.0).abs() < 0.01);
    }

    #[test]
    fn test_black_frame_too_dark() {
        let gate = QualityGate::default();
        assert!(matches!(
            gate.check(&frame(200, 200, 0)),
            Err(QualityRejection::TooDark { .. })
        ));
    }

    #[test]
    fn test_saturated_frame_too_bright() {
        let gate = QualityGate::default();
        assert!(matches!(
            gate.check(&frame(200, 200, 255)),
            Err(QualityRejection::TooBright { .. })
        ));
    }

    #[test]
    fn test_size_checked_before_brightness() {
        let gate = QualityGate::default();
        assert_eq!(
            gate.check(&frame(49, 200, 0)),
            Err(QualityRejection::TooSmall {
                width: 49,
                height: 200,
                minimum: 50
            })
        );
        assert!(gate.check(&frame(50, 50, 128)).is_ok());
    }

    #[test]
    fn test_empty_frame() {
        let gate = QualityGate::default();
        assert_eq!(
            gate.check(&Frame::gray(Vec::new(), 0, 0, 1)),
            Err(QualityRejection::Empty)
        );
    }
}
