//! Lifecycle state reported by the resource manager.

use crate::capture::DeviceInfo;
use serde::Serialize;

/// Where the shared handle is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    #[default]
    Idle,
    Opening,
    Active,
    Closing,
}

/// Snapshot returned by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceStatus {
    pub active: bool,
    pub opened: bool,
    pub state: ResourceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
}

/// Whether the platform lets us open the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    DeniedOrUnknown,
    Unknown,
}
