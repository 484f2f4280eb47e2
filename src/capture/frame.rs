//! Pixel buffers as they come off a device.

/// One image read from a camera handle.
///
/// Pixels are row-major and interleaved: one byte per pixel for grayscale
/// frames, three (R, G, B) for colour frames. `sequence` counts reads on the
/// handle that produced the frame.
#[derive(Clone)]
pub struct Frame {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    sequence: u64,
}

impl Frame {
    /// Wraps an interleaved RGB buffer.
    pub fn rgb(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self { pixels, width, height, channels: 3, sequence }
    }

    /// Wraps an 8-bit grayscale buffer.
    pub fn gray(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self { pixels, width, height, channels: 1, sequence }
    }

    /// Raw interleaved bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per pixel.
    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Read counter of the producing handle.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// `(width, height)` in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Width times height.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// True when the frame carries no pixel data at all.
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty() || self.pixel_count() == 0
    }

    /// Buffer length agrees with the dimensions and channel count.
    pub fn is_valid(&self) -> bool {
        self.pixels.len() == self.pixel_count() * self.channels as usize
    }

    /// Iterates the per-pixel luma values.
    ///
    /// Colour frames are converted with the BT.601 weights
    /// (0.299 R + 0.587 G + 0.114 B).
    pub fn luma(&self) -> impl Iterator<Item = f64> + '_ {
        let step = self.channels.max(1) as usize;
        self.pixels.chunks_exact(step).map(move |px| {
            if step >= 3 {
                0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64
            } else {
                px[0] as f64
            }
        })
    }

    /// Mean luminance in the 0-255 range, or `None` for an empty frame.
    pub fn mean_luminance(&self) -> Option<f64> {
        let (sum, count) = self
            .luma()
            .fold((0.0f64, 0usize), |(sum, count), l| (sum + l, count + 1));
        (count > 0).then(|| sum / count as f64)
    }

    /// Mean and population standard deviation of luminance.
    pub fn luminance_stats(&self) -> Option<(f64, f64)> {
        let mean = self.mean_luminance()?;
        let (sq, count) = self
            .luma()
            .fold((0.0f64, 0usize), |(sq, count), l| (sq + (l - mean).powi(2), count + 1));
        Some((mean, (sq / count as f64).sqrt()))
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("sequence", &self.sequence)
            .field("pixel_bytes", &self.pixels.len())
            .finish()
    }
}
