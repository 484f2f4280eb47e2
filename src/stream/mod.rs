//! Live JPEG frame stream.
//!
//! [`FrameStream`] is a lazy iterator over encoded frames from the shared
//! camera. It ends when the camera stops, when its [`StreamCancel`] is
//! raised, or after too many consecutive failed reads or encodes. A stream
//! that has ended stays ended; start a new one to resume.

use crate::capture::StreamConfig;
use crate::events::CameraEvent;
use crate::manager::ResourceManager;
use std::iter::FusedIterator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Content type of a response carrying [`EncodedFrame::multipart_part`]s.
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Cancellation signal shared between a stream and its consumer.
#[derive(Debug, Clone, Default)]
pub struct StreamCancel(Arc<AtomicBool>);

impl StreamCancel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ends the stream before its next read.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One JPEG-encoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Position in this stream, starting at 1.
    pub sequence: u64,
}

impl EncodedFrame {
    /// The frame as one part of a `multipart/x-mixed-replace` body.
    pub fn multipart_part(&self) -> Vec<u8> {
        const HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
        let mut part = Vec::with_capacity(HEADER.len() + self.bytes.len() + 2);
        part.extend_from_slice(HEADER);
        part.extend_from_slice(&self.bytes);
        part.extend_from_slice(b"\r\n");
        part
    }
}

/// Iterator of encoded frames while the camera stays active.
pub struct FrameStream {
    manager: Arc<ResourceManager>,
    config: StreamConfig,
    cancel: StreamCancel,
    warmed_up: bool,
    last_read: Option<Instant>,
    consecutive_errors: u32,
    frames: u64,
    finished: bool,
}

impl FrameStream {
    pub fn new(manager: Arc<ResourceManager>, config: StreamConfig) -> Self {
        Self {
            manager,
            config,
            cancel: StreamCancel::new(),
            warmed_up: false,
            last_read: None,
            consecutive_errors: 0,
            frames: 0,
            finished: false,
        }
    }

    /// Uses an existing cancellation signal.
    pub fn with_cancel(mut self, cancel: StreamCancel) -> Self {
        self.cancel = cancel;
        self
    }

    /// Signal that ends this stream.
    pub fn cancel_handle(&self) -> StreamCancel {
        self.cancel.clone()
    }

    /// Frames yielded so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled()
            || !self.manager.is_active()
            || self.consecutive_errors >= self.config.max_consecutive_errors
    }

    /// Discards the first few frames while exposure settles.
    fn warm_up(&mut self) {
        self.warmed_up = true;
        for read in 0..self.config.warmup_reads {
            if self.cancel.is_cancelled() || !self.manager.is_active() {
                return;
            }
            if let Err(e) = self.manager.read_frame() {
                tracing::trace!(read, error = %e, "Warm-up read failed");
            }
            if !self.config.warmup_delay().is_zero() {
                thread::sleep(self.config.warmup_delay());
            }
        }
    }

    /// Keeps reads at least one frame interval apart.
    fn pace(&mut self) {
        if let Some(last) = self.last_read {
            if let Some(wait) = self.config.frame_interval().checked_sub(last.elapsed()) {
                if !wait.is_zero() {
                    thread::sleep(wait);
                }
            }
        }
        self.last_read = Some(Instant::now());
    }

    fn finish(&mut self) -> Option<EncodedFrame> {
        self.finished = true;
        self.manager.events().emit(&CameraEvent::StreamEnded {
            frames: self.frames,
            consecutive_errors: self.consecutive_errors,
        });
        None
    }
}

impl Iterator for FrameStream {
    type Item = EncodedFrame;

    fn next(&mut self) -> Option<EncodedFrame> {
        if self.finished {
            return None;
        }
        if !self.warmed_up {
            self.warm_up();
        }

        loop {
            if self.should_stop() {
                return self.finish();
            }
            self.pace();

            let frame = match self.manager.read_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    self.consecutive_errors += 1;
                    tracing::debug!(errors = self.consecutive_errors, error = %e, "Stream read failed");
                    continue;
                }
            };

            match frame.encode_jpeg(self.config.jpeg_quality) {
                Ok(bytes) => {
                    self.consecutive_errors = 0;
                    self.frames += 1;
                    return Some(EncodedFrame {
                        bytes,
                        width: frame.width(),
                        height: frame.height(),
                        sequence: self.frames,
                    });
                }
                Err(e) => {
                    self.consecutive_errors += 1;
                    tracing::warn!(errors = self.consecutive_errors, error = %e, "Stream encode failed");
                }
            }
        }
    }
}

impl FusedIterator for FrameStream {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{DeviceConfig, SimulatedOpener, TimingConfig};
    use crate::events::EventLog;

    fn fast() -> StreamConfig {
        StreamConfig {
            warmup_delay_ms: 0,
            frame_interval_ms: 0,
            ..Default::default()
        }
    }

    fn started(opener: Arc<SimulatedOpener>) -> (Arc<ResourceManager>, Arc<EventLog>) {
        let log = Arc::new(EventLog::new());
        let manager = ResourceManager::new(opener, DeviceConfig::default(), TimingConfig::immediate())
            .with_events(log.clone());
        assert!(manager.start());
        (Arc::new(manager), log)
    }

    #[test]
    fn test_stream_yields_jpeg_frames() {
        let (manager, _) = started(Arc::new(SimulatedOpener::single()));
        let frames: Vec<_> = FrameStream::new(manager, fast()).take(3).collect();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].sequence, 3);
        assert_eq!((frames[0].width, frames[0].height), (640, 480));
        assert_eq!(&frames[0].bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_consecutive_failures_end_stream() {
        let opener = Arc::new(SimulatedOpener::single());
        let (manager, log) = started(opener.clone());
        opener.counters().set_fail_reads(true);

        let mut stream = FrameStream::new(manager, fast());
        assert!(stream.next().is_none());
        assert!(stream.next().is_none());

        assert!(log.snapshot().iter().any(|e| matches!(
            e,
            CameraEvent::StreamEnded { frames: 0, consecutive_errors: 10 }
        )));
    }

    #[test]
    fn test_failures_after_good_frames() {
        let opener = Arc::new(SimulatedOpener::single());
        let (manager, _) = started(opener.clone());
        let mut stream = FrameStream::new(manager, fast());

        assert!(stream.next().is_some());
        assert!(stream.next().is_some());
        opener.counters().set_fail_reads(true);
        assert_eq!(stream.by_ref().count(), 0);
        assert_eq!(stream.frames(), 2);
    }

    #[test]
    fn test_cancel_ends_stream() {
        let (manager, _) = started(Arc::new(SimulatedOpener::single()));
        let cancel = StreamCancel::new();
        let mut stream = FrameStream::new(manager, fast()).with_cancel(cancel.clone());

        assert!(stream.next().is_some());
        cancel.cancel();
        assert!(stream.next().is_none());
        assert!(stream.cancel_handle().is_cancelled());
    }

    #[test]
    fn test_stop_ends_stream() {
        let (manager, _) = started(Arc::new(SimulatedOpener::single()));
        let mut stream = FrameStream::new(Arc::clone(&manager), fast());

        assert!(stream.next().is_some());
        manager.stop();
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_inactive_camera_yields_nothing() {
        let opener = Arc::new(SimulatedOpener::single());
        let manager = Arc::new(ResourceManager::new(
            opener.clone(),
            DeviceConfig::default(),
            TimingConfig::immediate(),
        ));
        assert_eq!(FrameStream::new(manager, fast()).count(), 0);
        assert_eq!(opener.counters().reads(), 0);
    }

    #[test]
    fn test_warm_up_discards_configured_reads() {
        let opener = Arc::new(SimulatedOpener::single());
        let counters = opener.counters();
        let (manager, _) = started(opener);
        let config = fast();
        let reads_before = counters.reads();

        let mut stream = FrameStream::new(manager, config.clone());
        let first = stream.next().unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(
            counters.reads() - reads_before,
            u64::from(config.warmup_reads) + 1
        );

        stream.next().unwrap();
        assert_eq!(
            counters.reads() - reads_before,
            u64::from(config.warmup_reads) + 2
        );
    }

    #[test]
    fn test_reads_are_paced() {
        let (manager, _) = started(Arc::new(SimulatedOpener::single()));
        let config = StreamConfig {
            frame_interval_ms: 50,
            ..fast()
        };
        let mut stream = FrameStream::new(manager, config);

        // Four reads, each at least one interval after the previous one.
        let started = Instant::now();
        for _ in 0..4 {
            stream.next().unwrap();
        }
        assert!(started.elapsed() >= std::time::Duration::from_millis(150));
    }

    #[test]
    fn test_default_stream_timing() {
        let config = StreamConfig::default();
        assert_eq!(config.warmup_reads, 5);
        assert!(config.frame_interval() >= std::time::Duration::from_millis(100));
    }

    #[test]
    fn test_multipart_part_layout() {
        let frame = EncodedFrame {
            bytes: vec![0xFF, 0xD8, 0xFF, 0xD9],
            width: 1,
            height: 1,
            sequence: 1,
        };
        let part = frame.multipart_part();
        assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
        assert!(part.ends_with(&[0xFF, 0xD9, b'\r', b'\n']));
    }
}
