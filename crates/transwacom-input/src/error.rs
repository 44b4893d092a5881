//! Input subsystem errors.

use std::path::PathBuf;

use thiserror::Error;
use transwacom_types::DeviceType;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to open device: {0}")]
    DeviceOpen(String),

    #[error("device {0} is already being captured")]
    DeviceBusy(PathBuf),

    #[error("device {0} is not being captured")]
    NotCaptured(PathBuf),

    #[error("failed to create virtual device: {0}")]
    VirtualDeviceCreate(String),

    #[error("failed to inject event: {0}")]
    Inject(String),

    #[error("no virtual device template for device type {0}")]
    UnsupportedDevice(DeviceType),

    #[error("backend not available on this platform")]
    Unavailable,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
