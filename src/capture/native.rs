//! Hardware cameras through nokhwa.
//!
//! A nokhwa `Camera` is not `Send`, so each handle lives on its own worker
//! thread and is driven over a channel.

use super::device::{
    Backend, CameraDevice, CameraError, DeviceInfo, DeviceOpener, FormatRequest, OpenRequest,
};
use super::Frame;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long a single read may take before it counts as failed.
const READ_TIMEOUT: Duration = Duration::from_secs(3);

enum Command {
    Read(Sender<Result<Frame, CameraError>>),
    Close,
}

/// Opens physical cameras.
#[derive(Debug, Default, Clone, Copy)]
pub struct NokhwaOpener;

impl NokhwaOpener {
    pub fn new() -> Self {
        Self
    }

    fn api_backend(backend: Backend) -> ApiBackend {
        match backend {
            Backend::Auto => ApiBackend::Auto,
            Backend::Native => native_backend(),
        }
    }
}

#[cfg(target_os = "linux")]
fn native_backend() -> ApiBackend {
    ApiBackend::Video4Linux
}

#[cfg(target_os = "windows")]
fn native_backend() -> ApiBackend {
    ApiBackend::MediaFoundation
}

#[cfg(target_os = "macos")]
fn native_backend() -> ApiBackend {
    ApiBackend::AVFoundation
}

#[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
fn native_backend() -> ApiBackend {
    ApiBackend::Auto
}

fn requested_format(format: Option<FormatRequest>) -> RequestedFormat<'static> {
    match format {
        Some(f) => RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(Resolution::new(f.width, f.height), FrameFormat::MJPEG, f.fps),
        )),
        None => RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    }
}

fn classify_open_error(message: String) -> CameraError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        CameraError::PermissionDenied(message)
    } else {
        CameraError::OpenFailed(message)
    }
}

/// Describes a handle opened at `resolution`.
///
/// nokhwa exposes no control over the driver's frame queue, so the
/// requested buffer depth is never applied and is reported as 0.
fn opened_info(request: &OpenRequest, resolution: Resolution, fps: u32) -> DeviceInfo {
    DeviceInfo {
        device_id: request.device_id,
        backend: request.backend,
        width: resolution.width(),
        height: resolution.height(),
        fps,
        buffer_depth: 0,
        strategy: None,
    }
}

impl DeviceOpener for NokhwaOpener {
    fn open(&self, request: &OpenRequest) -> Result<Box<dyn CameraDevice>, CameraError> {
        let request = *request;
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<DeviceInfo, CameraError>>();

        let worker = thread::Builder::new()
            .name(format!("camera-{}", request.device_id))
            .spawn(move || run_worker(request, cmd_rx, ready_tx))
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(info)) => Ok(Box::new(NokhwaDevice {
                info,
                commands: cmd_tx,
                worker: Some(worker),
            })),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(CameraError::OpenFailed("camera worker exited".into()))
            }
        }
    }
}

fn run_worker(
    request: OpenRequest,
    commands: Receiver<Command>,
    ready: Sender<Result<DeviceInfo, CameraError>>,
) {
    let backend = NokhwaOpener::api_backend(request.backend);
    let mut camera = match Camera::with_backend(
        CameraIndex::Index(request.device_id),
        requested_format(request.format),
        backend,
    ) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(classify_open_error(e.to_string())));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(classify_open_error(e.to_string())));
        return;
    }

    let info = opened_info(&request, camera.resolution(), camera.frame_rate());
    if ready.send(Ok(info)).is_err() {
        let _ = camera.stop_stream();
        return;
    }

    let mut sequence = 0u64;
    while let Ok(command) = commands.recv() {
        match command {
            Command::Read(reply) => {
                let result = camera
                    .frame()
                    .and_then(|buffer| buffer.decode_image::<RgbFormat>())
                    .map(|image| {
                        sequence += 1;
                        let (width, height) = image.dimensions();
                        Frame::rgb(image.into_raw(), width, height, sequence)
                    })
                    .map_err(|e| CameraError::CaptureFailed(e.to_string()));
                let _ = reply.send(result);
            }
            Command::Close => break,
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!(device = request.device_id, error = %e, "Failed to stop camera stream");
    }
}

/// A physical camera handle.
pub struct NokhwaDevice {
    info: DeviceInfo,
    commands: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl CameraDevice for NokhwaDevice {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        if self.worker.is_none() {
            return Err(CameraError::NotInitialized);
        }
        let (reply_tx, reply_rx) = mpsc::channel();
        self.commands
            .send(Command::Read(reply_tx))
            .map_err(|_| CameraError::NotInitialized)?;
        reply_rx
            .recv_timeout(READ_TIMEOUT)
            .map_err(|_| CameraError::CaptureFailed("read timed out".into()))?
    }

    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.commands.send(Command::Close);
            if worker.join().is_err() {
                tracing::warn!(device = self.info.device_id, "Camera worker panicked");
            }
        }
    }
}

impl Drop for NokhwaDevice {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_depth_not_claimed() {
        let request = OpenRequest::new(0, Backend::Native).with_format(FormatRequest {
            width: 640,
            height: 480,
            fps: 30,
            buffer_depth: 1,
        });
        let info = opened_info(&request, Resolution::new(1280, 720), 25);
        assert_eq!(info.buffer_depth, 0);
        assert_eq!((info.width, info.height, info.fps), (1280, 720, 25));
    }

    #[test]
    fn test_open_error_classification() {
        assert!(matches!(
            classify_open_error("Permission denied (os error 13)".into()),
            CameraError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_open_error("device busy".into()),
            CameraError::OpenFailed(_)
        ));
    }
}
