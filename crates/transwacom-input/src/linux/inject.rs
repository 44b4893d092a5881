//! uinput-based event injection.
//!
//! One virtual device per device class, created lazily from a capability
//! template on the first batch and reused across sessions until process
//! shutdown or explicit release.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use evdev::uinput::VirtualDevice;
use evdev::{AbsInfo, AbsoluteAxisCode, AttributeSet, KeyCode, UinputAbsSetup};
use tracing::{debug, info, warn};
use transwacom_types::{DeviceType, InputEvent};

use crate::error::InputError;
use crate::{decode_wire_events, InputInjector};

/// Injects received batches into uinput virtual devices.
#[derive(Default)]
pub struct UinputInjector {
    devices: HashMap<DeviceType, VirtualDevice>,
    /// Types whose creation already failed; the failure is logged once.
    failed: HashSet<DeviceType>,
}

impl UinputInjector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_device(&mut self, device_type: DeviceType) -> Result<&mut VirtualDevice, InputError> {
        if !self.devices.contains_key(&device_type) {
            if self.failed.contains(&device_type) {
                return Err(InputError::VirtualDeviceCreate(format!(
                    "{device_type} virtual device unavailable"
                )));
            }
            match build_device(device_type) {
                Ok(device) => {
                    info!(device_type = %device_type, "created virtual device");
                    self.devices.insert(device_type, device);
                }
                Err(e) => {
                    self.failed.insert(device_type);
                    warn!(
                        device_type = %device_type,
                        error = %e,
                        "failed to create virtual device; check /dev/uinput permissions"
                    );
                    return Err(e);
                }
            }
        }
        Ok(self
            .devices
            .get_mut(&device_type)
            .unwrap_or_else(|| unreachable!("inserted above")))
    }
}

#[async_trait]
impl InputInjector for UinputInjector {
    async fn inject_batch(
        &mut self,
        device_type: DeviceType,
        events: &[InputEvent],
    ) -> Result<(), InputError> {
        let device = self.ensure_device(device_type)?;

        let decoded: Vec<evdev::InputEvent> = decode_wire_events(events)
            .into_iter()
            .map(|(class, code, value)| evdev::InputEvent::new(class.raw(), code, value))
            .collect();

        if !decoded.is_empty() {
            // emit() writes the whole batch followed by a SYN_REPORT, so
            // the OS applies it atomically.
            device
                .emit(&decoded)
                .map_err(|e| InputError::Inject(e.to_string()))?;
            debug!(device_type = %device_type, count = decoded.len(), "injected batch");
        }
        Ok(())
    }

    async fn destroy_all(&mut self) -> Result<(), InputError> {
        let count = self.devices.len();
        self.devices.clear();
        if count > 0 {
            info!(count, "destroyed virtual devices");
        }
        Ok(())
    }
}

fn build_device(device_type: DeviceType) -> Result<VirtualDevice, InputError> {
    match device_type {
        DeviceType::Wacom => build_tablet(),
        DeviceType::Joystick => build_gamepad(),
        DeviceType::Generic => Err(InputError::UnsupportedDevice(device_type)),
    }
}

fn build_tablet() -> Result<VirtualDevice, InputError> {
    let create = |e: std::io::Error| InputError::VirtualDeviceCreate(e.to_string());

    let mut keys = AttributeSet::<KeyCode>::new();
    for key in [
        KeyCode::BTN_TOOL_PEN,
        KeyCode::BTN_TOOL_RUBBER,
        KeyCode::BTN_TOUCH,
        KeyCode::BTN_STYLUS,
        KeyCode::BTN_STYLUS2,
    ] {
        keys.insert(key);
    }

    VirtualDevice::builder()
        .map_err(create)?
        .name("TransWacom Virtual Tablet")
        .with_keys(&keys)
        .map_err(create)?
        .with_absolute_axis(&UinputAbsSetup::new(
            AbsoluteAxisCode::ABS_X,
            AbsInfo::new(0, 0, 15360, 0, 0, 100),
        ))
        .map_err(create)?
        .with_absolute_axis(&UinputAbsSetup::new(
            AbsoluteAxisCode::ABS_Y,
            AbsInfo::new(0, 0, 10240, 0, 0, 100),
        ))
        .map_err(create)?
        .with_absolute_axis(&UinputAbsSetup::new(
            AbsoluteAxisCode::ABS_PRESSURE,
            AbsInfo::new(0, 0, 2047, 0, 0, 0),
        ))
        .map_err(create)?
        .with_absolute_axis(&UinputAbsSetup::new(
            AbsoluteAxisCode::ABS_TILT_X,
            AbsInfo::new(0, -64, 63, 0, 0, 0),
        ))
        .map_err(create)?
        .with_absolute_axis(&UinputAbsSetup::new(
            AbsoluteAxisCode::ABS_TILT_Y,
            AbsInfo::new(0, -64, 63, 0, 0, 0),
        ))
        .map_err(create)?
        .with_absolute_axis(&UinputAbsSetup::new(
            AbsoluteAxisCode::ABS_DISTANCE,
            AbsInfo::new(0, 0, 63, 0, 0, 0),
        ))
        .map_err(create)?
        .build()
        .map_err(create)
}

fn build_gamepad() -> Result<VirtualDevice, InputError> {
    let create = |e: std::io::Error| InputError::VirtualDeviceCreate(e.to_string());

    let mut keys = AttributeSet::<KeyCode>::new();
    for key in [
        KeyCode::BTN_SOUTH,
        KeyCode::BTN_EAST,
        KeyCode::BTN_NORTH,
        KeyCode::BTN_WEST,
        KeyCode::BTN_TL,
        KeyCode::BTN_TR,
        KeyCode::BTN_TL2,
        KeyCode::BTN_TR2,
        KeyCode::BTN_SELECT,
        KeyCode::BTN_START,
        KeyCode::BTN_MODE,
        KeyCode::BTN_THUMBL,
        KeyCode::BTN_THUMBR,
    ] {
        keys.insert(key);
    }

    let stick = AbsInfo::new(0, -32768, 32767, 0, 0, 0);
    let trigger = AbsInfo::new(0, 0, 255, 0, 0, 0);
    let hat = AbsInfo::new(0, -1, 1, 0, 0, 0);

    VirtualDevice::builder()
        .map_err(create)?
        .name("TransWacom Virtual Gamepad")
        .with_keys(&keys)
        .map_err(create)?
        .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_X, stick))
        .map_err(create)?
        .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_Y, stick))
        .map_err(create)?
        .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_RX, stick))
        .map_err(create)?
        .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_RY, stick))
        .map_err(create)?
        .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_Z, trigger))
        .map_err(create)?
        .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_RZ, trigger))
        .map_err(create)?
        .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_HAT0X, hat))
        .map_err(create)?
        .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_HAT0Y, hat))
        .map_err(create)?
        .build()
        .map_err(create)
}
