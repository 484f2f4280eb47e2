//! JPEG encoding of frames.

use super::Frame;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use thiserror::Error;

/// Errors that can occur while encoding a frame.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("frame buffer does not match its dimensions")]
    InvalidFrame,
    #[error("unsupported channel count: {0}")]
    UnsupportedChannels(u8),
    #[error("jpeg encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

impl Frame {
    /// Encodes the frame as a baseline JPEG at `quality` (1-100).
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, EncodeError> {
        if self.is_empty() || !self.is_valid() {
            return Err(EncodeError::InvalidFrame);
        }
        let color = match self.channels() {
            1 => ExtendedColorType::L8,
            3 => ExtendedColorType::Rgb8,
            other => return Err(EncodeError::UnsupportedChannels(other)),
        };

        let mut out = Vec::with_capacity(self.pixels().len() / 8);
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode(
            self.pixels(),
            self.width(),
            self.height(),
            color,
        )?;
        Ok(out)
    }
}
