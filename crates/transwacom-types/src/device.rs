//! Device descriptor types.

use serde::{Deserialize, Serialize};

/// Class of a shareable input device.
///
/// The class decides which virtual-device capability template the
/// consumer instantiates, so it is part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Wacom,
    Joystick,
    Generic,
}

impl DeviceType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wacom => "wacom",
            Self::Joystick => "joystick",
            Self::Generic => "generic",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeviceType {
    type Err = UnknownDeviceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wacom" => Ok(Self::Wacom),
            "joystick" => Ok(Self::Joystick),
            "generic" => Ok(Self::Generic),
            other => Err(UnknownDeviceType(other.to_string())),
        }
    }
}

/// Error for unrecognised device-type strings.
#[derive(Debug, thiserror::Error)]
#[error("unknown device type: {0}")]
pub struct UnknownDeviceType(pub String);

/// Describes a physical input device on the host machine.
///
/// Produced by enumeration; immutable once constructed. Sent inside the
/// handshake so the consumer can show the user what is being shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Device class.
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    /// OS handle (e.g. "/dev/input/event19").
    pub path: String,
    /// Human-readable name (e.g. "Wacom Intuos BT M Pen").
    pub name: String,
    /// Capability tags: pressure, tilt, proximity, stylus_buttons, eraser,
    /// left_stick, right_stick, triggers, dpad, buttons_N.
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u16>,
}

impl std::fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} - {}", self.device_type, self.path, self.name)
    }
}
