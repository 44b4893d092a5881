//! Input capture and injection for transwacom.
//!
//! The host side reads events from physical devices (evdev), batches
//! them, and hands batches to an async sink. The consumer side injects
//! received batches into lazily created virtual devices (uinput). Both
//! sides are defined around traits so the daemon can be tested with the
//! mock backends in [`mock`].

use async_trait::async_trait;
use tracing::warn;
use transwacom_types::{codes, DeviceType, EventClass, InputEvent};

pub mod batch;
pub mod claims;
pub mod error;

#[cfg(feature = "linux")]
pub mod linux;

#[cfg(any(feature = "mock", test))]
pub mod mock;

pub use batch::{EventBatcher, FLUSH_INTERVAL};
pub use claims::ClaimTable;
pub use error::InputError;

/// Host-side adjustments applied to a tablet while it is shared.
#[derive(Debug, Clone, Copy)]
pub struct CaptureOptions {
    /// Switch the tablet to relative positioning for the duration.
    pub relative_mode: bool,
    /// Disable local delivery of the device's events.
    pub disable_local: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            relative_mode: true,
            disable_local: true,
        }
    }
}

/// Decode a wire batch into raw `(class, code, value)` triples ready to
/// write to a virtual device.
///
/// Unknown codes are dropped with a warning and never fail the batch.
/// Sync events are dropped too: the injector re-synthesises the pulse
/// when it writes the batch.
#[must_use]
pub fn decode_wire_events(events: &[InputEvent]) -> Vec<(EventClass, u16, i32)> {
    events
        .iter()
        .filter_map(|event| match codes::resolve(&event.code) {
            Some((EventClass::Syn, _)) => None,
            Some((class, code)) => Some((class, code, event.value)),
            None => {
                warn!(code = %event.code, "dropping unknown event code");
                None
            }
        })
        .collect()
}

/// Injects received event batches into virtual devices.
///
/// A virtual device is created lazily on the first batch for a given
/// device class and reused across sessions of the same class.
#[async_trait]
pub trait InputInjector: Send + 'static {
    /// Write one batch to the virtual device for `device_type`, creating
    /// the device if needed, then emit a sync pulse. The batch is
    /// atomic: on error nothing further from it is written.
    async fn inject_batch(
        &mut self,
        device_type: DeviceType,
        events: &[InputEvent],
    ) -> Result<(), InputError>;

    /// Destroy all virtual devices.
    async fn destroy_all(&mut self) -> Result<(), InputError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_skipped_rest_decoded() {
        let events = vec![
            InputEvent::new("ABS_X", 500, 0.0),
            InputEvent::new("ABS_QUUX", 1, 0.0),
            InputEvent::new("ABS_PRESSURE", 200, 0.0),
            InputEvent::new("SYN_REPORT", 0, 0.0),
        ];
        let decoded = decode_wire_events(&events);
        assert_eq!(
            decoded,
            vec![(EventClass::Abs, 0x00, 500), (EventClass::Abs, 0x18, 200)]
        );
    }

    #[test]
    fn synthesised_names_dropped() {
        let events = vec![InputEvent::new("TYPE_21_CODE_5", 7, 0.0)];
        assert!(decode_wire_events(&events).is_empty());
    }
}
