//! Configuration for device access, capture and streaming.
//!
//! Every section has working defaults; a TOML file only needs to name
//! what it changes.

use super::device::FormatRequest;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which devices to try and how to configure them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device identifiers probed, in order.
    pub candidates: Vec<u32>,
    /// Requested capture width.
    pub width: u32,
    /// Requested capture height.
    pub height: u32,
    /// Requested frame rate, 1 to 120.
    pub fps: u32,
    /// Driver frame buffer depth (1 keeps reads fresh).
    pub buffer_depth: u32,
    /// Resolutions swept by the last access tier, largest first.
    pub sweep_resolutions: Vec<(u32, u32)>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            candidates: vec![0, 1],
            width: 640,
            height: 480,
            fps: 30,
            buffer_depth: 1,
            sweep_resolutions: vec![(1920, 1080), (1280, 720), (640, 480), (320, 240)],
        }
    }
}

impl DeviceConfig {
    /// The fixed property set pushed to freshly opened handles.
    pub fn format(&self) -> FormatRequest {
        self.format_at(self.width, self.height)
    }

    /// The property set at another resolution.
    pub fn format_at(&self, width: u32, height: u32) -> FormatRequest {
        FormatRequest {
            width,
            height,
            fps: self.fps,
            buffer_depth: self.buffer_depth,
        }
    }

    /// Rejects zero-sized resolutions and frame rates outside 1-120.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = std::iter::once((self.width, self.height))
            .chain(self.sweep_resolutions.iter().copied())
            .find(|&(w, h)| w == 0 || h == 0);
        if let Some((width, height)) = zero {
            return Err(ConfigError::Dimensions { width, height });
        }
        if !(1..=120).contains(&self.fps) {
            return Err(ConfigError::FrameRate(self.fps));
        }
        Ok(())
    }
}

/// Warm-up and backoff delays, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Warm-up after opening a probe handle during scanning.
    pub scan_warmup_ms: u64,
    /// Warm-up after opening a handle in `start`.
    pub start_warmup_ms: u64,
    /// Delay between failed validation reads in `start`.
    pub start_backoff_ms: u64,
    /// Warm-up for the direct-open fallback.
    pub fallback_warmup_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            scan_warmup_ms: 500,
            start_warmup_ms: 1000,
            start_backoff_ms: 500,
            fallback_warmup_ms: 2000,
        }
    }
}

impl TimingConfig {
    /// No delays at all (for testing).
    pub fn immediate() -> Self {
        Self {
            scan_warmup_ms: 0,
            start_warmup_ms: 0,
            start_backoff_ms: 0,
            fallback_warmup_ms: 0,
        }
    }

    pub fn scan_warmup(&self) -> Duration {
        Duration::from_millis(self.scan_warmup_ms)
    }

    pub fn start_warmup(&self) -> Duration {
        Duration::from_millis(self.start_warmup_ms)
    }

    pub fn start_backoff(&self) -> Duration {
        Duration::from_millis(self.start_backoff_ms)
    }

    pub fn fallback_warmup(&self) -> Duration {
        Duration::from_millis(self.fallback_warmup_ms)
    }
}

/// Still capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Minimum interval between successful captures.
    pub debounce_ms: u64,
    /// Frame read attempts per capture.
    pub read_attempts: u32,
    /// Delay between failed reads.
    pub read_retry_delay_ms: u64,
    /// Smallest accepted width or height.
    pub min_dimension: u32,
    /// Mean luminance below this is rejected as too dark.
    pub dark_threshold: f64,
    /// Mean luminance above this is rejected as too bright.
    pub bright_threshold: f64,
    /// JPEG quality for stored images.
    pub jpeg_quality: u8,
    /// Failure records kept in the statistics log.
    pub error_log_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            read_attempts: 3,
            read_retry_delay_ms: 100,
            min_dimension: 50,
            dark_threshold: 1.0,
            bright_threshold: 250.0,
            jpeg_quality: 95,
            error_log_capacity: 10,
        }
    }
}

impl CaptureConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn read_retry_delay(&self) -> Duration {
        Duration::from_millis(self.read_retry_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_attempts == 0 {
            return Err(ConfigError::InvalidRetryBudget);
        }
        if self.dark_threshold >= self.bright_threshold {
            return Err(ConfigError::InvalidLuminanceRange);
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(ConfigError::InvalidJpegQuality);
        }
        Ok(())
    }
}

/// Live preview stream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Discarded reads before the first frame.
    pub warmup_reads: u32,
    /// Delay after each warm-up read.
    pub warmup_delay_ms: u64,
    /// Minimum interval between reads.
    pub frame_interval_ms: u64,
    /// Consecutive failures that end the stream.
    pub max_consecutive_errors: u32,
    /// JPEG quality for streamed frames.
    pub jpeg_quality: u8,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            warmup_reads: 5,
            warmup_delay_ms: 200,
            frame_interval_ms: 100,
            max_consecutive_errors: 10,
            jpeg_quality: 85,
        }
    }
}

impl StreamConfig {
    pub fn warmup_delay(&self) -> Duration {
        Duration::from_millis(self.warmup_delay_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_consecutive_errors == 0 {
            return Err(ConfigError::InvalidRetryBudget);
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(ConfigError::InvalidJpegQuality);
        }
        Ok(())
    }
}

/// Where results go.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory captured images are stored in.
    pub image_dir: PathBuf,
    /// Prometheus exporter port; 0 turns it off.
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("images"),
            metrics_port: 9090,
        }
    }
}

/// Why a configuration was refused.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("resolution {width}x{height} has a zero side")]
    Dimensions { width: u32, height: u32 },
    #[error("frame rate {0} is outside 1-120 fps")]
    FrameRate(u32),
    #[error("retry budgets must be at least 1")]
    InvalidRetryBudget,
    #[error("dark threshold must be below bright threshold")]
    InvalidLuminanceRange,
    #[error("JPEG quality must be 1-100")]
    InvalidJpegQuality,
    #[error("cannot read {path}: {message}")]
    Read { path: PathBuf, message: String },
    #[error("malformed TOML: {0}")]
    Parse(String),
}

/// The TOML document, one table per section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub device: DeviceConfig,
    pub timing: TimingConfig,
    pub capture: CaptureConfig,
    pub stream: StreamConfig,
    pub output: OutputConfig,
}

impl FileConfig {
    /// Reads `path` and hands it to [`FileConfig::from_toml`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml(&text)
    }

    /// Parses and validates configuration text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.device.validate()?;
        self.capture.validate()?;
        self.stream.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(FileConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_sides_rejected() {
        let mut config = DeviceConfig::default();
        config.width = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Dimensions { width: 0, height: 480 })
        ));

        let mut config = DeviceConfig::default();
        config.sweep_resolutions.push((320, 0));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Dimensions { width: 320, height: 0 })
        ));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = FileConfig::from_toml(
            r#"
            [capture]
            debounce_ms = 250

            [device]
            candidates = [2]
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.debounce(), Duration::from_millis(250));
        assert_eq!(config.capture.read_attempts, 3);
        assert_eq!(config.device.candidates, vec![2]);
        assert_eq!(config.device.width, 640);
        assert_eq!(config.stream.max_consecutive_errors, 10);
    }

    #[test]
    fn test_inverted_luminance_range_rejected() {
        let result = FileConfig::from_toml(
            r#"
            [capture]
            dark_threshold = 200.0
            bright_threshold = 100.0
            "#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidLuminanceRange)));
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = FileConfig::from_file("/nonexistent/camera-desk.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/camera-desk.toml"));
    }
}
