//! Camera Desk Library
//!
//! Shared-camera resource management with debounced, quality-gated still
//! capture and a live JPEG frame stream.
//!
//! # Architecture
//!
//! ```text
//! capture (devices) → scanner → manager ─┬→ pipeline (stills) ─┐
//!                                        └→ stream (preview)   ├→ service
//!                              events, metrics ────────────────┘
//! ```
//!
//! - [`manager::ResourceManager`] is the only owner of the hardware handle.
//!   Start and stop are serialised; reads are not.
//! - [`pipeline::CapturePipeline`] checks debounce, camera state, frame
//!   reads, quality and persistence, in that order, and keeps statistics.
//! - [`stream::FrameStream`] yields encoded frames until the camera stops,
//!   the stream is cancelled or reads keep failing.
//! - [`service::CameraService`] turns all of it into client commands.
//!
//! # Example
//!
//! ```no_run
//! use camera_desk::{
//!     capture::{CaptureConfig, DeviceConfig, SimulatedOpener, StreamConfig, TimingConfig},
//!     manager::ResourceManager,
//!     pipeline::MemoryStore,
//!     service::CameraService,
//! };
//! use std::sync::Arc;
//!
//! let manager = ResourceManager::new(
//!     Arc::new(SimulatedOpener::single()),
//!     DeviceConfig::default(),
//!     TimingConfig::default(),
//! );
//! let service = CameraService::new(
//!     Arc::new(manager),
//!     Arc::new(MemoryStore::new()),
//!     CaptureConfig::default(),
//!     StreamConfig::default(),
//! );
//!
//! assert!(service.start_camera().success);
//! let outcome = service.capture();
//! println!("{}", serde_json::to_string_pretty(&outcome).unwrap());
//! service.stop_camera();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod error;
pub mod events;
pub mod manager;
pub mod metrics;
pub mod pipeline;
pub mod scanner;
pub mod service;
pub mod stream;

// Re-export commonly used types at crate root
pub use capture::{CameraDevice, CameraError, DeviceOpener, FileConfig, Frame};
pub use error::{CaptureError, QualityRejection};
pub use events::{CameraEvent, EventSink};
pub use manager::{ResourceManager, ResourceState};
pub use pipeline::{CapturePipeline, CapturedImage};
pub use service::{CameraService, Outcome};
pub use stream::{EncodedFrame, FrameStream, StreamCancel};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
