//! Prometheus metrics for capture outcomes.
//!
//! # Metrics Exposed
//!
//! - `camera_desk_captures_total` - Capture attempts
//! - `camera_desk_captures_successful_total` - Captures that stored an image
//! - `camera_desk_captures_failed_total` - Captures that failed
//! - `camera_desk_capture_seconds_average` - Mean successful capture latency
//! - `camera_desk_camera_active` - Camera state (1=active, 0=idle)
//!
//! With the `metrics` feature, [`MetricsServer`] serves them over HTTP.
//!
//! # Example
//!
//! ```no_run
//! use camera_desk::metrics::{MetricsRegistry, MetricsSnapshot};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! registry.update(&MetricsSnapshot {
//!     camera_active: true,
//!     total_captures: 10,
//!     successful_captures: 9,
//!     failed_captures: 1,
//!     average_capture_seconds: 0.42,
//!     epoch: 0,
//! });
//! println!("{}", registry.encode().unwrap());
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};
