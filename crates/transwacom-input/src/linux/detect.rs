//! Input device detection.
//!
//! Enumerates `/dev/input/event*` and classifies tablets and gamepads,
//! deriving the capability tags advertised in the handshake.

use evdev::{AbsoluteAxisCode, Device, EventType, KeyCode};
use tracing::debug;
use transwacom_types::{DeviceDescriptor, DeviceType};

/// Detects shareable input devices.
#[derive(Debug, Default)]
pub struct DeviceDetector;

impl DeviceDetector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Enumerate all supported input devices.
    ///
    /// Re-run periodically; descriptors are immutable snapshots.
    #[must_use]
    pub fn detect_all(&self) -> Vec<DeviceDescriptor> {
        let mut devices = Vec::new();

        for (path, device) in evdev::enumerate() {
            if let Some(descriptor) = classify(&path, &device) {
                debug!(device = %descriptor, "detected device");
                devices.push(descriptor);
            }
        }

        devices
    }

    /// Look up a single device by path.
    #[must_use]
    pub fn detect_path(&self, path: &std::path::Path) -> Option<DeviceDescriptor> {
        let device = Device::open(path).ok()?;
        classify(path, &device)
    }
}

fn classify(path: &std::path::Path, device: &Device) -> Option<DeviceDescriptor> {
    let name = device.name().unwrap_or("Unknown Device").to_string();

    let device_type = if is_tablet_name(&name) {
        DeviceType::Wacom
    } else if has_joystick_axes(device) {
        DeviceType::Joystick
    } else {
        return None;
    };

    let capabilities = match device_type {
        DeviceType::Wacom => wacom_capabilities(device),
        DeviceType::Joystick => joystick_capabilities(device),
        DeviceType::Generic => Vec::new(),
    };

    let input_id = device.input_id();
    Some(DeviceDescriptor {
        device_type,
        path: path.display().to_string(),
        name,
        capabilities,
        vendor_id: Some(input_id.vendor()),
        product_id: Some(input_id.product()),
    })
}

fn is_tablet_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("wacom") || lower.contains("pen")
}

fn has_joystick_axes(device: &Device) -> bool {
    if !device.supported_events().contains(EventType::ABSOLUTE)
        || !device.supported_events().contains(EventType::KEY)
    {
        return false;
    }
    device.supported_absolute_axes().is_some_and(|axes| {
        axes.contains(AbsoluteAxisCode::ABS_X)
            || axes.contains(AbsoluteAxisCode::ABS_RX)
            || axes.contains(AbsoluteAxisCode::ABS_HAT0X)
    })
}

fn wacom_capabilities(device: &Device) -> Vec<String> {
    let mut caps = Vec::new();

    if let Some(axes) = device.supported_absolute_axes() {
        if axes.contains(AbsoluteAxisCode::ABS_PRESSURE) {
            caps.push("pressure".to_string());
        }
        if axes.contains(AbsoluteAxisCode::ABS_TILT_X)
            && axes.contains(AbsoluteAxisCode::ABS_TILT_Y)
        {
            caps.push("tilt".to_string());
        }
        if axes.contains(AbsoluteAxisCode::ABS_DISTANCE) {
            caps.push("proximity".to_string());
        }
    }

    if let Some(keys) = device.supported_keys() {
        if keys.contains(KeyCode::BTN_STYLUS) {
            caps.push("stylus_buttons".to_string());
        }
        if keys.contains(KeyCode::BTN_TOOL_RUBBER) {
            caps.push("eraser".to_string());
        }
    }

    caps
}

fn joystick_capabilities(device: &Device) -> Vec<String> {
    let mut caps = Vec::new();

    if let Some(axes) = device.supported_absolute_axes() {
        if axes.contains(AbsoluteAxisCode::ABS_X) && axes.contains(AbsoluteAxisCode::ABS_Y) {
            caps.push("left_stick".to_string());
        }
        if axes.contains(AbsoluteAxisCode::ABS_RX) && axes.contains(AbsoluteAxisCode::ABS_RY) {
            caps.push("right_stick".to_string());
        }
        if axes.contains(AbsoluteAxisCode::ABS_Z) || axes.contains(AbsoluteAxisCode::ABS_RZ) {
            caps.push("triggers".to_string());
        }
        if axes.contains(AbsoluteAxisCode::ABS_HAT0X) && axes.contains(AbsoluteAxisCode::ABS_HAT0Y)
        {
            caps.push("dpad".to_string());
        }
    }

    if let Some(keys) = device.supported_keys() {
        let button_count = keys
            .iter()
            .filter(|k| (KeyCode::BTN_SOUTH.0..=KeyCode::BTN_THUMBR.0).contains(&k.0))
            .count();
        if button_count > 0 {
            caps.push(format!("buttons_{button_count}"));
        }
    }

    caps
}
